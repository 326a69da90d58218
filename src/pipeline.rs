//! Title acquisition: resolve, fetch metadata, decode, fetch contents and
//! optionally repack into an NSP.
//!
//! Directory layout under the configured output directory:
//!
//! ```text
//! <base>/                                   base application
//! <base>/<update>/<version>/                update
//! <base>/<addon>/                           add-on content
//! 0100000000000816/<version>/<title>/       titles of a system update
//! ```
//!
//! Every stage runs to completion before the next starts. An error stops the
//! acquisition; files already on disk are kept so the next run resumes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cdn::{Channel, Endpoints, Request, Transport};
use crate::config::{Config, Paths};
use crate::decrypt::{Decryptor, SectionDirs};
use crate::error::RecordError;
use crate::fetch::ByteRangeFetcher;
use crate::formats::cnmt::{ContentId, ContentMetadataRecord, ContentType, PackageType};
use crate::formats::nca::NcaHeader;
use crate::formats::pfs0::Pfs0Builder;
use crate::formats::ticket::{Cetk, synthesize_ticket};
use crate::keys::{RightsId, TitleKey};
use crate::manifest;
use crate::request::TitleRequest;
use crate::title::{TitleId, TitleKind};
use crate::{Error, Result};

/// Order contents are downloaded in: small files first.
pub const FETCH_ORDER: [ContentType; 7] = [
    ContentType::Control,
    ContentType::HtmlDocument,
    ContentType::LegalInformation,
    ContentType::DeltaFragment,
    ContentType::Program,
    ContentType::Data,
    ContentType::Meta,
];

/// Content groups placed between the license files and the metadata NCA.
const ARCHIVE_ORDER: [ContentType; 5] = [
    ContentType::Program,
    ContentType::LegalInformation,
    ContentType::Control,
    ContentType::HtmlDocument,
    ContentType::DeltaFragment,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    FetchingMetadata,
    Decoding,
    FetchingContent,
    BuildingArchive,
    Done,
    Failed,
}

/// License files prepared for an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct License {
    pub certificate: Option<PathBuf>,
    pub ticket: Option<PathBuf>,
}

/// Everything one title acquisition left on disk.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub title: TitleId,
    pub version: u32,
    pub dir: PathBuf,
    pub record: ContentMetadataRecord,
    /// The metadata NCA.
    pub meta_path: PathBuf,
    /// Manifest XML, written when repacking.
    pub manifest: Option<PathBuf>,
    pub license: License,
    /// Downloaded contents in download order.
    pub contents: Vec<(ContentType, PathBuf)>,
    /// The NSP, when one was built.
    pub archive: Option<PathBuf>,
}

impl Acquisition {
    /// Files of the archive, in the order they are packed.
    pub fn archive_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        files.extend(self.license.certificate.clone());
        files.extend(self.license.ticket.clone());
        let of_type = |t: ContentType| {
            self.contents
                .iter()
                .filter(move |(ty, _)| *ty == t)
                .map(|(_, p)| p.clone())
        };
        for t in ARCHIVE_ORDER {
            files.extend(of_type(t));
        }
        files.push(self.meta_path.clone());
        files.extend(self.manifest.clone());
        files.extend(of_type(ContentType::Data));
        files
    }
}

/// A downloaded system update and its titles.
#[derive(Debug, Clone)]
pub struct SystemUpdate {
    pub version: u32,
    pub dir: PathBuf,
    pub record: ContentMetadataRecord,
    pub titles: Vec<Acquisition>,
}

/// Metadata NCA fetched and decoded.
struct Meta {
    path: PathBuf,
    dirs: SectionDirs,
    record: ContentMetadataRecord,
}

/// Drives acquisitions through a transport and a decryptor.
pub struct Pipeline<T, D> {
    endpoints: Endpoints,
    paths: Paths,
    fetcher: ByteRangeFetcher<T>,
    decryptor: D,
    stage: Stage,
}

impl<T: Transport, D: Decryptor> Pipeline<T, D> {
    pub fn new(config: &Config, fetcher: ByteRangeFetcher<T>, decryptor: D) -> Self {
        Self {
            endpoints: Endpoints::new(&config.values),
            paths: config.paths.clone(),
            fetcher,
            decryptor,
            stage: Stage::Done,
        }
    }

    /// Stage of the last acquisition; `Done` or `Failed` once it returned.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
    }

    fn settle<R>(&mut self, result: Result<R>) -> Result<R> {
        let stage = if result.is_ok() { Stage::Done } else { Stage::Failed };
        self.enter(stage);
        result
    }

    /// Directory a title is downloaded to.
    pub fn title_dir(&self, title: TitleId, version: u32) -> Result<PathBuf> {
        let out = &self.paths.output_dir;
        Ok(match title.require_kind()? {
            TitleKind::Base => out.join(title.to_string()),
            TitleKind::Update => out
                .join(title.base()?.to_string())
                .join(title.to_string())
                .join(version.to_string()),
            TitleKind::AddOn => out.join(title.base()?.to_string()).join(title.to_string()),
        })
    }

    /// Download a base title, update or add-on, and repack it when asked.
    pub fn download_game(&mut self, request: &TitleRequest, repack: bool) -> Result<Acquisition> {
        self.enter(Stage::Resolving);
        let result = self.title_dir(request.title, request.version).and_then(|dir| {
            self.acquire_title(
                &dir,
                Channel::Application,
                request.title,
                request.version,
                request.key.as_ref(),
                repack,
            )
        });
        self.settle(result)
    }

    /// Download a system update and every title it lists.
    pub fn download_system_update(&mut self, version: u32) -> Result<SystemUpdate> {
        self.enter(Stage::Resolving);
        let result = self.acquire_system_update(version);
        self.settle(result)
    }

    fn acquire_system_update(&mut self, version: u32) -> Result<SystemUpdate> {
        let title = TitleId::SYSTEM_UPDATE;
        let dir = self
            .paths
            .output_dir
            .join(title.to_string())
            .join(version.to_string());
        fs::create_dir_all(&dir)?;

        let head = self.endpoints.system_update_meta(version);
        let meta = self.fetch_meta(&dir, title, version, &head, |e, id| {
            e.system_update_content(id)
        })?;
        if meta.record.package_type != PackageType::SystemUpdate {
            return Err(RecordError::UnexpectedPackageType {
                expected: PackageType::SystemUpdate,
                found: meta.record.package_type,
            }
            .into());
        }

        let entries = meta.record.system_titles().to_vec();
        info!(version, titles = entries.len(), "system update");
        let mut titles = Vec::with_capacity(entries.len());
        for entry in entries {
            self.enter(Stage::Resolving);
            let title_dir = dir.join(entry.title.to_string());
            titles.push(self.acquire_title(
                &title_dir,
                Channel::System,
                entry.title,
                entry.version,
                None,
                false,
            )?);
        }

        Ok(SystemUpdate {
            version,
            dir,
            record: meta.record,
            titles,
        })
    }

    fn acquire_title(
        &mut self,
        dir: &Path,
        channel: Channel,
        title: TitleId,
        version: u32,
        key: Option<&TitleKey>,
        repack: bool,
    ) -> Result<Acquisition> {
        info!("{title} v{version}");
        fs::create_dir_all(dir)?;

        let head = self.endpoints.title_meta(channel, title, version);
        let meta = self.fetch_meta(dir, title, version, &head, |e, id| {
            e.meta_content(channel, id)
        })?;

        let mut license = License::default();
        let mut manifest_path = None;
        if repack {
            let header = NcaHeader::open(&meta.dirs.header)?;
            let key_generation = header.key_generation;
            let rights_id = RightsId::new(title, key_generation);
            license = self.prepare_license(dir, &meta.record, key, key_generation, &rights_id)?;

            let xml = meta.path.with_extension("xml");
            manifest::write(&meta.record, &meta.path, key_generation, &xml)?;
            manifest_path = Some(xml);
        }

        self.enter(Stage::FetchingContent);
        let mut contents = Vec::new();
        for content_type in FETCH_ORDER {
            for entry in meta.record.contents(Some(content_type)) {
                info!("downloading {content_type} entry ({}.nca)", entry.id);
                let path = dir.join(format!("{}.nca", entry.id));
                self.fetcher
                    .fetch(&self.endpoints.content(channel, &entry.id), &path)?;
                contents.push((content_type, path));
            }
        }

        let mut acquisition = Acquisition {
            title,
            version,
            dir: dir.to_path_buf(),
            record: meta.record,
            meta_path: meta.path,
            manifest: manifest_path,
            license,
            contents,
            archive: None,
        };

        if repack {
            self.enter(Stage::BuildingArchive);
            let label = title.require_kind()?.label();
            let out = dir.join(format!("{title} [{label}][v{version}].nsp"));
            info!("creating {}", out.display());
            Pfs0Builder::new(acquisition.archive_files()).build(&out)?;
            acquisition.archive = Some(out);
        }
        Ok(acquisition)
    }

    /// Resolve the metadata content id, fetch the metadata NCA and decode it.
    fn fetch_meta(
        &mut self,
        dir: &Path,
        title: TitleId,
        version: u32,
        head_url: &str,
        content_url: impl Fn(&Endpoints, &ContentId) -> String,
    ) -> Result<Meta> {
        let id = self.content_id(head_url, || format!("metadata of {title} v{version}"))?;
        let id: ContentId = id.parse()?;

        self.enter(Stage::FetchingMetadata);
        info!("downloading CNMT ({id}.cnmt.nca)");
        let path = dir.join(format!("{id}.cnmt.nca"));
        self.fetcher.fetch(&content_url(&self.endpoints, &id), &path)?;

        self.enter(Stage::Decoding);
        let dirs = SectionDirs::for_nca(&path);
        self.decryptor.decrypt(&path, &dirs)?;
        let record = ContentMetadataRecord::decode(&fs::read(dirs.section0_file()?)?)?;
        debug!(
            package_type = %record.package_type,
            title = %record.title,
            version = record.version,
            "decoded metadata"
        );
        Ok(Meta { path, dirs, record })
    }

    /// HEAD `url` and return its content id header.
    fn content_id(&self, url: &str, what: impl FnOnce() -> String) -> Result<String> {
        let response = self.fetcher.transport().send(&Request::head(url))?;
        match response.status {
            403 => Err(Error::Rejected(url.to_owned())),
            200..=299 => response.content_id.ok_or_else(|| Error::NotFound(what())),
            404 => Err(Error::NotFound(what())),
            status => Err(Error::UnexpectedStatus {
                url: url.to_owned(),
                status,
            }),
        }
    }

    fn prepare_license(
        &self,
        dir: &Path,
        record: &ContentMetadataRecord,
        key: Option<&TitleKey>,
        key_generation: u8,
        rights_id: &RightsId,
    ) -> Result<License> {
        let cert_path = dir.join(format!("{rights_id}.cert"));
        let tik_path = dir.join(format!("{rights_id}.tik"));

        match record.package_type {
            PackageType::Application | PackageType::AddOnContent => {
                let template = &self.paths.certificate_template;
                fs::copy(template, &cert_path).map_err(|e| {
                    Error::Config(format!(
                        "cannot copy certificate template {}: {e}",
                        template.display()
                    ))
                })?;
                let Some(key) = key else {
                    warn!("no title key given, the archive will not contain a ticket");
                    return Ok(License {
                        certificate: Some(cert_path),
                        ticket: None,
                    });
                };
                let template = fs::read(&self.paths.ticket_template).map_err(|e| {
                    Error::Config(format!(
                        "cannot read ticket template {}: {e}",
                        self.paths.ticket_template.display()
                    ))
                })?;
                fs::write(
                    &tik_path,
                    synthesize_ticket(&template, key, key_generation, rights_id)?,
                )?;
                info!("generated {rights_id}.cert and {rights_id}.tik");
            }
            PackageType::Patch => {
                info!("downloading cetk");
                let id = self.content_id(&self.endpoints.rights(rights_id), || {
                    format!("ticket {rights_id}")
                })?;
                let cetk_path = dir.join(format!("{rights_id}.cetk"));
                self.fetcher.fetch(&self.endpoints.license(&id), &cetk_path)?;
                let cetk = Cetk::split(&fs::read(&cetk_path)?)?;
                info!(
                    title_key = %cetk.title_key,
                    "extracted {rights_id}.cert and {rights_id}.tik from cetk"
                );
                fs::write(&tik_path, &cetk.ticket)?;
                fs::write(&cert_path, &cetk.certificate)?;
            }
            other => {
                warn!(package_type = %other, "no license material for this package type");
                return Ok(License::default());
            }
        }

        Ok(License {
            certificate: Some(cert_path),
            ticket: Some(tik_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs::File;

    use super::*;
    use crate::config::Values;
    use crate::decrypt::tests::FakeDecryptor;
    use crate::fetch::tests::MockCdn;
    use crate::formats::cnmt::tests::content_record;
    use crate::formats::nca::tests::header_bytes;
    use crate::formats::pfs0::Pfs0;

    const META_ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        endpoints: Endpoints,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("Certificate.cert");
        let tik = dir.path().join("Ticket.tik");
        fs::write(&cert, vec![0xCE; 0x700]).unwrap();
        fs::write(&tik, vec![0x00; 0x2C0]).unwrap();
        let config = Config {
            paths: Paths {
                certificate_template: cert,
                ticket_template: tik,
                output_dir: dir.path().join("out"),
                ..Paths::default()
            },
            values: Values::default(),
        };
        let endpoints = Endpoints::new(&config.values);
        Fixture {
            _dir: dir,
            config,
            endpoints,
        }
    }

    fn id(n: usize) -> ContentId {
        ContentId([0x10 + n as u8; 16])
    }

    /// A CDN serving one title whose record lists the given content types.
    fn serve_title(
        f: &Fixture,
        channel: Channel,
        title: TitleId,
        version: u32,
        package_type: u8,
        types: &[u16],
    ) -> (MockCdn, Vec<u8>) {
        let entries: Vec<_> = types.iter().map(|&t| (t, 16)).collect();
        let record = content_record(package_type, title.0, 0x10, &entries);
        let meta_id: ContentId = META_ID.parse().unwrap();

        let mut cdn = MockCdn::default().with_file(
            &f.endpoints.meta_content(channel, &meta_id),
            b"meta nca".to_vec(),
        );
        cdn.content_ids.insert(
            f.endpoints.title_meta(channel, title, version),
            META_ID.to_owned(),
        );
        for n in 0..types.len() {
            cdn.files
                .insert(f.endpoints.content(channel, &id(n)), vec![n as u8; 16]);
        }
        (cdn, record)
    }

    fn decryptor(records: &[(&str, Vec<u8>)]) -> FakeDecryptor {
        FakeDecryptor {
            records: records
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
            header: header_bytes(2, 4),
        }
    }

    fn names(path: &Path) -> Vec<String> {
        let pfs0 = Pfs0::parse(&mut File::open(path).unwrap()).unwrap();
        pfs0.files.into_iter().map(|f| f.name).collect()
    }

    #[test]
    fn base_title_is_fetched_and_packed_in_order() {
        let f = fixture();
        let title = TitleId(0x0100_0000_0001_0000);
        // Program, Data, Control, LegalInformation, HtmlDocument
        let (cdn, record) = serve_title(&f, Channel::Application, title, 0, 0x80, &[1, 2, 3, 5, 4]);
        let request = TitleRequest {
            title,
            version: 0,
            key: Some(TitleKey([0x77; 16])),
        };

        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(META_ID, record)]),
        );
        let got = pipeline.download_game(&request, true).unwrap();
        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(got.dir, f.config.paths.output_dir.join("0100000000010000"));

        let content_url = |n| f.endpoints.content(Channel::Application, &id(n));
        let meta_id: ContentId = META_ID.parse().unwrap();
        assert_eq!(
            cdn.get_urls(),
            [
                f.endpoints.meta_content(Channel::Application, &meta_id),
                content_url(2),
                content_url(4),
                content_url(3),
                content_url(0),
                content_url(1),
            ]
        );

        let rights = RightsId::new(title, 4);
        let archive = got.archive.unwrap();
        assert_eq!(
            archive.file_name().unwrap(),
            "0100000000010000 [GAME][v0].nsp"
        );
        let nca = |n| format!("{}.nca", id(n));
        assert_eq!(
            names(&archive),
            [
                format!("{rights}.cert"),
                format!("{rights}.tik"),
                nca(0),
                nca(3),
                nca(2),
                nca(4),
                format!("{META_ID}.cnmt.nca"),
                format!("{META_ID}.cnmt.xml"),
                nca(1),
            ]
        );

        let tik = fs::read(got.dir.join(format!("{rights}.tik"))).unwrap();
        assert_eq!(&tik[0x180..0x190], &[0x77; 16]);
        assert_eq!(tik[0x285], 4);
    }

    #[test]
    fn addon_without_key_is_packed_without_ticket() {
        let f = fixture();
        let title = TitleId(0x0100_0000_0001_1001);
        let (cdn, record) = serve_title(&f, Channel::Application, title, 0x10000, 0x82, &[2]);
        let request = TitleRequest {
            title,
            version: 0x10000,
            key: None,
        };

        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(META_ID, record)]),
        );
        let got = pipeline.download_game(&request, true).unwrap();
        assert_eq!(
            got.dir,
            f.config
                .paths
                .output_dir
                .join("0100000000010000")
                .join("0100000000011001")
        );
        let archive = got.archive.unwrap();
        assert!(archive.ends_with("0100000000011001 [DLC][v65536].nsp"));
        let files = names(&archive);
        assert_eq!(files.len(), 4);
        assert!(files[0].ends_with(".cert"));
        assert!(files.iter().all(|n| !n.ends_with(".tik")));
    }

    #[test]
    fn update_license_comes_from_cetk() {
        let f = fixture();
        let title = TitleId(0x0100_0000_0001_0800);
        let (mut cdn, record) = serve_title(&f, Channel::Application, title, 65536, 0x81, &[1]);
        let rights = RightsId::new(title, 4);
        let mut cetk = vec![0u8; 0x2C0 + 0x700];
        cetk[0x180..0x190].fill(0x99);
        cetk[0x2C0..].fill(0xCC);
        cdn.content_ids
            .insert(f.endpoints.rights(&rights), "feed".into());
        cdn.files.insert(f.endpoints.license("feed"), cetk);

        let request = TitleRequest {
            title,
            version: 65536,
            key: None,
        };
        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(META_ID, record)]),
        );
        let got = pipeline.download_game(&request, true).unwrap();

        assert_eq!(
            got.dir,
            f.config
                .paths
                .output_dir
                .join("0100000000010000")
                .join("0100000000010800")
                .join("65536")
        );
        let tik = fs::read(got.license.ticket.unwrap()).unwrap();
        assert_eq!(tik.len(), 0x2C0);
        assert_eq!(&tik[0x180..0x190], &[0x99; 16]);
        let cert = fs::read(got.license.certificate.unwrap()).unwrap();
        assert_eq!(cert, vec![0xCC; 0x700]);
        assert!(got.archive.unwrap().ends_with("0100000000010800 [UPDATE][v65536].nsp"));
    }

    #[test]
    fn plain_download_skips_license_and_archive() {
        let f = fixture();
        let title = TitleId(0x0100_0000_0001_0000);
        let (cdn, record) = serve_title(&f, Channel::Application, title, 0, 0x80, &[1, 3]);
        let request = TitleRequest {
            title,
            version: 0,
            key: None,
        };
        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(META_ID, record)]),
        );
        let got = pipeline.download_game(&request, false).unwrap();
        assert!(got.archive.is_none());
        assert!(got.manifest.is_none());
        assert_eq!(got.license, License::default());
        assert_eq!(got.contents.len(), 2);
        assert_eq!(got.contents[0].0, ContentType::Control);
    }

    #[test]
    fn second_run_resumes_without_rewriting() {
        let f = fixture();
        let title = TitleId(0x0100_0000_0001_0000);
        let (cdn, record) = serve_title(&f, Channel::Application, title, 0, 0x80, &[1]);
        let request = TitleRequest {
            title,
            version: 0,
            key: None,
        };
        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(META_ID, record)]),
        );
        let first = pipeline.download_game(&request, false).unwrap();
        let second = pipeline.download_game(&request, false).unwrap();
        assert_eq!(first.contents, second.contents);
        // Both GETs of the second run asked for the bytes after the local size.
        let log = cdn.log.borrow();
        let resumed: Vec<_> = log.iter().filter_map(|r| r.range_start).collect();
        assert_eq!(resumed, [8, 16]);
    }

    #[test]
    fn missing_metadata_fails_the_acquisition() {
        let f = fixture();
        let cdn = MockCdn::default();
        let request: TitleRequest = "0100000000010000-0".parse().unwrap();
        let mut pipeline = Pipeline::new(&f.config, ByteRangeFetcher::new(&cdn), decryptor(&[]));

        let err = pipeline.download_game(&request, false).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref what) if what.contains("0100000000010000 v0")));
        assert_eq!(pipeline.stage(), Stage::Failed);
    }

    #[test]
    fn invalid_title_id_is_rejected_before_any_request() {
        let f = fixture();
        let cdn = MockCdn::default();
        let request: TitleRequest = "0100000000010200-0".parse().unwrap();
        let mut pipeline = Pipeline::new(&f.config, ByteRangeFetcher::new(&cdn), decryptor(&[]));

        assert!(matches!(
            pipeline.download_game(&request, false),
            Err(Error::InvalidTitleId(_))
        ));
        assert!(cdn.log.borrow().is_empty());
    }

    #[test]
    fn system_update_fetches_listed_titles_from_system_channel() {
        let f = fixture();
        let listed = TitleId(0x0100_0000_0000_0809);
        let (mut cdn, title_record) = serve_title(&f, Channel::System, listed, 7, 0x02, &[2]);

        // SystemUpdate record listing one title.
        let mut sysupdate = vec![0u8; 0x20 + 0x10 + 0x20];
        sysupdate[0x00..0x08].copy_from_slice(&TitleId::SYSTEM_UPDATE.0.to_le_bytes());
        sysupdate[0x0C] = 0x03;
        sysupdate[0x12..0x14].copy_from_slice(&1u16.to_le_bytes());
        sysupdate[0x20..0x28].copy_from_slice(&listed.0.to_le_bytes());
        sysupdate[0x28..0x2C].copy_from_slice(&7u32.to_le_bytes());
        sysupdate[0x2C] = 0x02;

        let sys_id = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let sys_content: ContentId = sys_id.parse().unwrap();
        cdn.content_ids
            .insert(f.endpoints.system_update_meta(450), sys_id.into());
        cdn.files.insert(
            f.endpoints.system_update_content(&sys_content),
            b"sysupdate nca".to_vec(),
        );

        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(sys_id, sysupdate), (META_ID, title_record)]),
        );
        let got = pipeline.download_system_update(450).unwrap();

        assert_eq!(got.record.package_type, PackageType::SystemUpdate);
        assert_eq!(got.titles.len(), 1);
        let title = &got.titles[0];
        assert_eq!(
            title.dir,
            f.config
                .paths
                .output_dir
                .join("0100000000000816")
                .join("450")
                .join("0100000000000809")
        );
        assert!(title.archive.is_none());
        assert!(cdn
            .get_urls()
            .iter()
            .all(|u| u.starts_with("https://atumn.")));
    }

    #[test]
    fn system_update_endpoint_serving_another_package_type_fails() {
        let f = fixture();
        let mut cdn = MockCdn::default();
        let sys_id = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let sys_content: ContentId = sys_id.parse().unwrap();
        cdn.content_ids
            .insert(f.endpoints.system_update_meta(450), sys_id.into());
        cdn.files.insert(
            f.endpoints.system_update_content(&sys_content),
            b"application nca".to_vec(),
        );
        let application = content_record(0x80, 0x0100_0000_0001_0000, 0x10, &[(1, 4)]);

        let mut pipeline = Pipeline::new(
            &f.config,
            ByteRangeFetcher::new(&cdn),
            decryptor(&[(sys_id, application)]),
        );
        let err = pipeline.download_system_update(450).unwrap_err();

        assert_eq!(
            err.to_string(),
            "malformed metadata record: expected a SystemUpdate record, found Application"
        );
        assert!(matches!(
            err,
            Error::MalformedRecord(RecordError::UnexpectedPackageType {
                expected: PackageType::SystemUpdate,
                found: PackageType::Application,
            })
        ));
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert_eq!(cdn.get_urls().len(), 1);
    }
}
