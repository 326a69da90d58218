//! Hand-off to the external NCA decryption tool.
//!
//! Decryption is a black box: the pipeline names an input NCA and a set of
//! output directories and expects the plaintext sections and header to be
//! there afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::Paths;
use crate::{Error, Result};

/// Output locations for one decrypted NCA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDirs {
    pub root: PathBuf,
    pub exefs: PathBuf,
    pub romfs: PathBuf,
    pub sections: [PathBuf; 4],
    /// Plaintext NCA header.
    pub header: PathBuf,
}

impl SectionDirs {
    /// Directories next to `nca`, named after it without its extension:
    /// `X.cnmt.nca` decrypts into `X.cnmt/`.
    pub fn for_nca(nca: &Path) -> Self {
        let root = nca.with_extension("");
        Self {
            exefs: root.join("exefs"),
            romfs: root.join("romfs"),
            sections: std::array::from_fn(|n| root.join(format!("section{n}"))),
            header: root.join("Header.bin"),
            root,
        }
    }

    pub fn section0(&self) -> &Path {
        &self.sections[0]
    }

    /// The single file extracted into section 0.
    pub fn section0_file(&self) -> Result<PathBuf> {
        let dir = self.section0();
        let mut files = fs::read_dir(dir)
            .map_err(|e| Error::Decrypt {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect::<Vec<_>>();
        files.sort();
        files.into_iter().next().ok_or_else(|| Error::Decrypt {
            path: dir.to_path_buf(),
            reason: "section 0 is empty".into(),
        })
    }
}

/// Turns an encrypted NCA into plaintext sections.
pub trait Decryptor {
    fn decrypt(&self, input: &Path, out: &SectionDirs) -> Result<()>;
}

impl<D: Decryptor + ?Sized> Decryptor for &D {
    fn decrypt(&self, input: &Path, out: &SectionDirs) -> Result<()> {
        (**self).decrypt(input, out)
    }
}

/// Runs `hactool`.
#[derive(Debug, Clone)]
pub struct Hactool {
    binary: PathBuf,
    keys: Option<PathBuf>,
}

impl Hactool {
    pub fn new(binary: impl Into<PathBuf>, keys: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            keys,
        }
    }

    /// Tool and key file from the configured paths. An empty key path means
    /// the tool's own default.
    pub fn from_paths(paths: &Paths) -> Self {
        let keys = (!paths.keys.as_os_str().is_empty()).then(|| paths.keys.clone());
        Self::new(paths.hactool.clone(), keys)
    }

    fn command(&self, input: &Path, out: &SectionDirs) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(input);
        if let Some(keys) = &self.keys {
            cmd.arg("-k").arg(keys);
        }
        cmd.arg(dir_flag("exefsdir", &out.exefs));
        cmd.arg(dir_flag("romfsdir", &out.romfs));
        for (n, dir) in out.sections.iter().enumerate() {
            cmd.arg(dir_flag(&format!("section{n}dir"), dir));
        }
        cmd.arg(dir_flag("header", &out.header));
        cmd
    }
}

fn dir_flag(name: &str, path: &Path) -> std::ffi::OsString {
    let mut flag = std::ffi::OsString::from(format!("--{name}="));
    flag.push(path);
    flag
}

impl Decryptor for Hactool {
    fn decrypt(&self, input: &Path, out: &SectionDirs) -> Result<()> {
        let fail = |reason: String| Error::Decrypt {
            path: input.to_path_buf(),
            reason,
        };

        fs::create_dir_all(&out.root)?;
        let mut cmd = self.command(input, out);
        debug!(?cmd, "running decryption tool");
        let output = cmd
            .output()
            .map_err(|e| fail(format!("cannot run {}: {e}", self.binary.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{} ({})", output.status, stderr.trim())));
        }

        let empty = fs::read_dir(&out.root)?.next().is_none();
        if empty {
            return Err(fail(format!("output folder {} is empty", out.root.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Stands in for the external tool: writes the record prepared for the
    /// NCA's content id into section 0, plus a prepared header.
    #[derive(Default)]
    pub(crate) struct FakeDecryptor {
        pub(crate) records: HashMap<String, Vec<u8>>,
        pub(crate) header: Vec<u8>,
    }

    impl Decryptor for FakeDecryptor {
        fn decrypt(&self, input: &Path, out: &SectionDirs) -> Result<()> {
            let stem = input
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('.').next())
                .unwrap_or_default();
            let record = self.records.get(stem).ok_or_else(|| Error::Decrypt {
                path: input.to_path_buf(),
                reason: "no record prepared".into(),
            })?;
            fs::create_dir_all(out.section0())?;
            fs::write(out.section0().join(format!("Application_{stem}.cnmt")), record)?;
            fs::write(&out.header, &self.header)?;
            Ok(())
        }
    }

    #[test]
    fn section_dirs_strip_one_extension() {
        let dirs = SectionDirs::for_nca(Path::new("/out/abcd.cnmt.nca"));
        assert_eq!(dirs.root, PathBuf::from("/out/abcd.cnmt"));
        assert_eq!(dirs.section0(), Path::new("/out/abcd.cnmt/section0"));
        assert_eq!(dirs.sections[3], PathBuf::from("/out/abcd.cnmt/section3"));
        assert_eq!(dirs.header, PathBuf::from("/out/abcd.cnmt/Header.bin"));
    }

    #[test]
    fn hactool_command_line() {
        let tool = Hactool::new("/bin/hactool", Some("/k/prod.keys".into()));
        let dirs = SectionDirs::for_nca(Path::new("/o/x.cnmt.nca"));
        let cmd = tool.command(Path::new("/o/x.cnmt.nca"), &dirs);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "/o/x.cnmt.nca",
                "-k",
                "/k/prod.keys",
                "--exefsdir=/o/x.cnmt/exefs",
                "--romfsdir=/o/x.cnmt/romfs",
                "--section0dir=/o/x.cnmt/section0",
                "--section1dir=/o/x.cnmt/section1",
                "--section2dir=/o/x.cnmt/section2",
                "--section3dir=/o/x.cnmt/section3",
                "--header=/o/x.cnmt/Header.bin",
            ]
        );
    }

    #[test]
    fn empty_key_path_is_omitted() {
        let paths = Paths {
            keys: PathBuf::new(),
            ..Paths::default()
        };
        let tool = Hactool::from_paths(&paths);
        let dirs = SectionDirs::for_nca(Path::new("a.nca"));
        let cmd = tool.command(Path::new("a.nca"), &dirs);
        assert!(cmd.get_args().all(|a| a != "-k"));
    }

    #[test]
    fn missing_tool_is_a_decrypt_error() {
        let dir = tempfile::tempdir().unwrap();
        let nca = dir.path().join("x.cnmt.nca");
        fs::write(&nca, b"nca").unwrap();
        let tool = Hactool::new(dir.path().join("no-such-tool"), None);
        let err = tool.decrypt(&nca, &SectionDirs::for_nca(&nca)).unwrap_err();
        assert!(matches!(err, Error::Decrypt { .. }));
    }

    #[test]
    fn section0_file_requires_content() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = SectionDirs::for_nca(&dir.path().join("x.cnmt.nca"));
        fs::create_dir_all(dirs.section0()).unwrap();
        assert!(dirs.section0_file().is_err());
        fs::write(dirs.section0().join("Patch_x.cnmt"), b"rec").unwrap();
        assert_eq!(
            dirs.section0_file().unwrap(),
            dirs.section0().join("Patch_x.cnmt")
        );
    }
}
