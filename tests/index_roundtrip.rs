use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use csearch_rs::{Index, IndexWriter};

fn write_corpus(dir: &Path, files: &[(&str, &[u8])]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for (name, content) in files {
        let p = dir.join(name);
        std::fs::write(&p, content)?;
        names.push(p.to_string_lossy().into_owned());
    }
    Ok(names)
}

fn build_index(dir: &Path, names: &[String]) -> Result<PathBuf> {
    let out = dir.join("csearchindex");
    let mut ix = IndexWriter::create(&out)?;
    ix.add_paths([dir.to_string_lossy().into_owned()]);
    for name in names {
        ix.add_file(name)?;
    }
    ix.flush()?;
    Ok(out)
}

/// All trigrams of a text buffer, the same way the writer forms them.
fn trigrams_of(content: &[u8]) -> BTreeSet<u32> {
    content
        .windows(3)
        .map(|w| (w[0] as u32) << 16 | (w[1] as u32) << 8 | w[2] as u32)
        .collect()
}

#[test]
fn roundtrip_names_paths_and_postings() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let names = write_corpus(
        dir.path(),
        &[
            ("a.txt", b"hello world" as &[u8]),
            ("b.txt", b"hello there"),
            ("c.txt", b"package main\nfunc main() {}\n"),
        ],
    )?;
    let out = build_index(dir.path(), &names)?;
    let ix = Index::open(&out)?;

    assert_eq!(ix.num_files(), 3);
    assert_eq!(ix.paths()?, vec![dir.path().to_string_lossy().into_owned()]);
    for (i, name) in names.iter().enumerate() {
        assert_eq!(ix.name(i as u32)?, name.as_str());
    }

    // Every trigram of every indexed file lists that file, and every
    // posting list is strictly increasing.
    for (i, (_, content)) in [
        ("a.txt", b"hello world" as &[u8]),
        ("b.txt", b"hello there"),
        ("c.txt", b"package main\nfunc main() {}\n"),
    ]
    .iter()
    .enumerate()
    {
        for t in trigrams_of(content) {
            let list = ix.posting_list(t)?;
            assert!(
                list.contains(&(i as u32)),
                "file {} missing from posting list {:06x}",
                i,
                t
            );
            assert!(list.windows(2).all(|w| w[0] < w[1]));
        }
    }

    // And the reverse: posting lists only name files that contain the
    // trigram.
    let hel = (b'h' as u32) << 16 | (b'e' as u32) << 8 | b'l' as u32;
    assert_eq!(ix.posting_list(hel)?, vec![0, 1]);
    let wor = (b'w' as u32) << 16 | (b'o' as u32) << 8 | b'r' as u32;
    assert_eq!(ix.posting_list(wor)?, vec![0]);
    let absent = (b'z' as u32) << 16 | (b'z' as u32) << 8 | b'q' as u32;
    assert_eq!(ix.posting_list(absent)?, Vec::<u32>::new());
    Ok(())
}

#[test]
fn skip_policy() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let long_line = vec![b'a'; 3000];
    let names = write_corpus(
        dir.path(),
        &[
            ("keep.txt", b"normal text file\n" as &[u8]),
            ("longline.txt", &long_line),
            ("binary.bin", b"abc\x00def"),
            ("badutf8.txt", b"abc\xffdef"),
        ],
    )?;
    let out = build_index(dir.path(), &names)?;
    let ix = Index::open(&out)?;

    // Only keep.txt survives; skipped files get no file id at all.
    assert_eq!(ix.num_files(), 1);
    assert_eq!(ix.name(0)?, names[0].as_str());

    // Nothing from the skipped files leaked into any posting list.
    for t in trigrams_of(b"abc\x00def").into_iter().chain(trigrams_of(&long_line)) {
        for fileid in ix.posting_list(t)? {
            assert_eq!(fileid, 0);
        }
    }
    Ok(())
}

#[test]
fn max_file_len_and_trigram_caps() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let names = write_corpus(
        dir.path(),
        &[
            ("small.txt", b"tiny\n" as &[u8]),
            ("big.txt", b"this one is too large for the cap\n"),
        ],
    )?;
    let out = dir.path().join("csearchindex");
    let mut ix = IndexWriter::create(&out)?;
    ix.max_file_len = 10;
    for name in &names {
        ix.add_file(name)?;
    }
    ix.flush()?;
    let ix = Index::open(&out)?;
    assert_eq!(ix.num_files(), 1);
    assert_eq!(ix.name(0)?, names[0].as_str());

    let out2 = dir.path().join("csearchindex2");
    let mut w = IndexWriter::create(&out2)?;
    w.max_trigrams = 5;
    for name in &names {
        w.add_file(name)?;
    }
    w.flush()?;
    let ix2 = Index::open(&out2)?;
    // "tiny\n" has 3 trigrams, the long file far more than 5.
    assert_eq!(ix2.num_files(), 1);
    Ok(())
}

#[test]
fn spill_path_produces_identical_index() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let files: Vec<(String, Vec<u8>)> = (0..20)
        .map(|i| {
            (
                format!("f{:02}.txt", i),
                format!("file number {} with shared words and unique{}\n", i, i).into_bytes(),
            )
        })
        .collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_slice()))
        .collect();
    let names = write_corpus(dir.path(), &refs)?;

    let big = dir.path().join("index-mem");
    let mut w = IndexWriter::create(&big)?;
    w.add_paths([dir.path().to_string_lossy().into_owned()]);
    for name in &names {
        w.add_file(name)?;
    }
    w.flush()?;

    let small = dir.path().join("index-spill");
    let mut w = IndexWriter::create(&small)?;
    // Tiny post buffer: every file forces at least one spill, so the
    // merge path runs over many temp files.
    w.max_post = 8;
    w.add_paths([dir.path().to_string_lossy().into_owned()]);
    for name in &names {
        w.add_file(name)?;
    }
    w.flush()?;

    assert_eq!(std::fs::read(&big)?, std::fs::read(&small)?);
    Ok(())
}

#[test]
fn trailer_offsets_are_ordered_and_in_bounds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let names = write_corpus(dir.path(), &[("a.txt", b"some indexed text\n" as &[u8])])?;
    let out = build_index(dir.path(), &names)?;

    let data = std::fs::read(&out)?;
    let trailer = b"\ncsearch trailr\n";
    assert!(data.ends_with(trailer));
    let n = data.len() - trailer.len() - 5 * 4;
    let mut prev = 0u32;
    for i in 0..5 {
        let off = u32::from_be_bytes(data[n + 4 * i..n + 4 * i + 4].try_into().unwrap());
        assert!(off >= prev, "section offsets must not decrease");
        assert!((off as usize) <= n, "section offset past file end");
        prev = off;
    }
    Ok(())
}

#[test]
fn corrupt_index_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let names = write_corpus(dir.path(), &[("a.txt", b"some indexed text\n" as &[u8])])?;
    let out = build_index(dir.path(), &names)?;

    let good = std::fs::read(&out)?;

    let mut bad = good.clone();
    let last = bad.len() - 1;
    bad[last] ^= 0xff;
    let bad_path = dir.path().join("bad-trailer");
    std::fs::write(&bad_path, &bad)?;
    assert!(Index::open(&bad_path).is_err());

    let mut bad = good.clone();
    bad[0] ^= 0xff;
    let bad_path = dir.path().join("bad-magic");
    std::fs::write(&bad_path, &bad)?;
    assert!(Index::open(&bad_path).is_err());

    let truncated = &good[..good.len() / 2];
    let bad_path = dir.path().join("truncated");
    std::fs::write(&bad_path, truncated)?;
    assert!(Index::open(&bad_path).is_err());
    Ok(())
}

#[test]
fn empty_corpus_still_builds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = build_index(dir.path(), &[])?;
    let ix = Index::open(&out)?;
    assert_eq!(ix.num_files(), 0);
    let abc = (b'a' as u32) << 16 | (b'b' as u32) << 8 | b'c' as u32;
    assert_eq!(ix.posting_list(abc)?, Vec::<u32>::new());
    Ok(())
}
