//! `<cnmt id>.cnmt.xml`: the human-readable description of a metadata record
//! that installers expect next to the metadata NCA.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::Result;
use crate::formats::cnmt::{ContentMetadataRecord, ContentType};

/// The metadata NCA as it appears in its own manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaContent {
    /// File stem of the NCA (its content id).
    pub id: String,
    pub size: u64,
    pub hash: [u8; 32],
}

impl MetaContent {
    /// Size and SHA-256 of the metadata NCA at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or_default()
            .to_owned();
        let mut hasher = Sha256::new();
        let mut reader = BufReader::new(File::open(path)?);
        let size = io::copy(&mut reader, &mut hasher)?;
        Ok(Self {
            id,
            size,
            hash: hasher.finalize().into(),
        })
    }
}

struct Xml {
    out: String,
    depth: usize,
}

impl Xml {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n"),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>");
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth -= 1;
        self.indent();
        let _ = writeln!(self.out, "</{tag}>");
    }

    // Values are ids, numbers and enum names; none need escaping.
    fn leaf(&mut self, tag: &str, value: impl std::fmt::Display) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>{value}</{tag}>");
    }

    fn content(&mut self, kind: ContentType, id: &str, size: u64, hash: &[u8], key_generation: u8) {
        self.open("Content");
        self.leaf("Type", kind);
        self.leaf("Id", id);
        self.leaf("Size", size);
        self.leaf("Hash", hex::encode(hash));
        self.leaf("KeyGeneration", key_generation);
        self.close("Content");
    }
}

/// Render the manifest for `record`.
pub fn render(record: &ContentMetadataRecord, meta: &MetaContent, key_generation: u8) -> String {
    let mut xml = Xml::new();
    xml.open("ContentMeta");
    xml.leaf("Type", record.package_type);
    xml.leaf("Id", format_args!("0x{}", record.title));
    xml.leaf("Version", record.version);
    xml.leaf(
        "RequiredDownloadSystemVersion",
        record.required_download_system_version,
    );
    for entry in record.contents(None) {
        xml.content(
            entry.content_type,
            &entry.id.to_string(),
            entry.size,
            &entry.hash,
            key_generation,
        );
    }
    xml.content(ContentType::Meta, &meta.id, meta.size, &meta.hash, key_generation);
    xml.leaf("Digest", hex::encode(record.digest));
    xml.leaf("KeyGenerationMin", key_generation);
    xml.leaf("RequiredSystemVersion", record.required_system_version);
    xml.leaf("PatchId", format_args!("0x{}", record.patch_id()));
    xml.close("ContentMeta");
    xml.out
}

/// Write the manifest for the metadata NCA at `nca` to `out`.
pub fn write(
    record: &ContentMetadataRecord,
    nca: &Path,
    key_generation: u8,
    out: &Path,
) -> Result<()> {
    let meta = MetaContent::from_file(nca)?;
    fs::write(out, render(record, &meta, key_generation))?;
    info!("generated {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::cnmt::tests::content_record;

    fn record() -> ContentMetadataRecord {
        let buf = content_record(0x81, 0x0100_0000_0001_0800, 0x10, &[(1, 100), (3, 42)]);
        ContentMetadataRecord::decode(&buf).unwrap()
    }

    #[test]
    fn renders_every_field() {
        let meta = MetaContent {
            id: "cafebabecafebabecafebabecafebabe".into(),
            size: 4096,
            hash: [0x5A; 32],
        };
        let xml = render(&record(), &meta, 5);
        let lines: Vec<_> = xml.lines().collect();

        assert_eq!(lines[0], r#"<?xml version="1.0" encoding="utf-8"?>"#);
        assert_eq!(lines[1], "<ContentMeta>");
        assert_eq!(lines[2], "  <Type>Patch</Type>");
        assert_eq!(lines[3], "  <Id>0x0100000000010800</Id>");
        assert_eq!(lines[4], "  <Version>65536</Version>");
        assert_eq!(
            lines[5],
            "  <RequiredDownloadSystemVersion>201326592</RequiredDownloadSystemVersion>"
        );
        assert_eq!(lines[6], "  <Content>");
        assert_eq!(lines[7], "    <Type>Program</Type>");
        assert_eq!(lines[8], format!("    <Id>{}</Id>", "10".repeat(16)));
        assert_eq!(lines[9], "    <Size>100</Size>");
        assert_eq!(lines[10], format!("    <Hash>{}</Hash>", "a0".repeat(32)));
        assert_eq!(lines[11], "    <KeyGeneration>5</KeyGeneration>");
        assert!(xml.contains("<Type>Control</Type>"));
        assert!(xml.contains("<Id>cafebabecafebabecafebabecafebabe</Id>"));
        assert!(xml.contains("<Size>4096</Size>"));
        assert!(xml.contains(&format!("<Digest>{}</Digest>", "dd".repeat(32))));
        assert!(xml.contains("<KeyGenerationMin>5</KeyGenerationMin>"));
        assert!(xml.contains("<RequiredSystemVersion>218103808</RequiredSystemVersion>"));
        assert!(xml.contains("<PatchId>0x0100000000010000</PatchId>"));
        assert_eq!(lines.last(), Some(&"</ContentMeta>"));
        assert_eq!(xml.matches("<Content>").count(), 3);
    }

    #[test]
    fn meta_content_hashes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let nca = dir.path().join("00ff.cnmt.nca");
        fs::write(&nca, b"abc").unwrap();

        let meta = MetaContent::from_file(&nca).unwrap();
        assert_eq!(meta.id, "00ff");
        assert_eq!(meta.size, 3);
        assert_eq!(
            hex::encode(meta.hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let out = dir.path().join("00ff.cnmt.xml");
        write(&record(), &nca, 2, &out).unwrap();
        assert!(fs::read_to_string(&out).unwrap().contains("<Size>3</Size>"));
    }
}
