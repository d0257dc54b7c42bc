use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::download::errors::InjectError;
use crate::download::task::SinfRecord;
use crate::install::plist::to_plist_xml;

pub type Result<T> = std::result::Result<T, InjectError>;

/// Embeds the license records (and the metadata blob, when present) into the
/// downloaded archive in place. Entries are appended to the existing zip so
/// the payload, which can run to several gigabytes, is never rewritten.
pub async fn inject(archive: &Path, sinfs: &[SinfRecord], metadata: &Value) -> Result<()> {
    let archive: PathBuf = archive.to_path_buf();
    let sinfs = sinfs.to_vec();
    let metadata = metadata.clone();
    tokio::task::spawn_blocking(move || inject_blocking(&archive, &sinfs, &metadata))
        .await
        .map_err(|_| InjectError::Join)?
}

fn inject_blocking(archive: &Path, sinfs: &[SinfRecord], metadata: &Value) -> Result<()> {
    let (app_dir, app_name) = locate_app_bundle(archive)?;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(archive)?;
    let mut writer = ZipWriter::new_append(file)?;
    // sinf bytes are already encrypted license material, not worth deflating
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for record in sinfs {
        let bytes = BASE64
            .decode(record.sinf.as_bytes())
            .map_err(|_| InjectError::BadLicenseRecord { id: record.id })?;
        let name = if record.id == 0 {
            format!("{app_dir}/SC_Info/{app_name}.sinf")
        } else {
            format!("{app_dir}/SC_Info/{app_name}.{}.sinf", record.id)
        };
        writer.start_file(name, options)?;
        writer.write_all(&bytes).map_err(InjectError::from)?;
    }

    if !metadata.is_null() {
        writer.start_file("iTunesMetadata.plist", options)?;
        writer
            .write_all(to_plist_xml(metadata).as_bytes())
            .map_err(InjectError::from)?;
    }

    writer.finish()?;
    Ok(())
}

/// Finds the `Payload/<Name>.app` directory the platform requires. Returns
/// the directory path inside the archive and the bundle name.
fn locate_app_bundle(archive: &Path) -> Result<(String, String)> {
    let file = std::fs::File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|err| InjectError::MalformedArchive(format!("not a zip archive: {err}")))?;

    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let name = entry.name();
        let Some(rest) = name.strip_prefix("Payload/") else {
            continue;
        };
        let Some(first) = rest.split('/').next() else {
            continue;
        };
        if let Some(stem) = first.strip_suffix(".app") {
            if !stem.is_empty() {
                return Ok((format!("Payload/{first}"), stem.to_string()));
            }
        }
    }

    Err(InjectError::MalformedArchive(
        "no Payload/<Name>.app directory".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn temp_archive(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "otadrop-inject-{tag}-{}-{nanos}.ipa",
            std::process::id()
        ))
    }

    fn write_app_archive(path: &Path) {
        let file = std::fs::File::create(path).expect("create");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer
            .start_file("Payload/Demo.app/Info.plist", options)
            .expect("entry");
        writer.write_all(b"<plist/>").expect("write");
        writer
            .start_file("Payload/Demo.app/Demo", options)
            .expect("entry");
        writer.write_all(b"\x00binary\x00").expect("write");
        writer.finish().expect("finish");
    }

    fn read_entry(path: &Path, name: &str) -> Vec<u8> {
        let file = std::fs::File::open(path).expect("open");
        let mut zip = ZipArchive::new(file).expect("zip");
        let mut entry = zip.by_name(name).expect("entry");
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).expect("read");
        buf
    }

    fn sinf(id: u64, payload: &[u8]) -> SinfRecord {
        SinfRecord {
            id,
            sinf: BASE64.encode(payload),
        }
    }

    #[tokio::test]
    async fn appends_sinfs_under_sc_info() {
        let path = temp_archive("sinfs");
        write_app_archive(&path);

        inject(
            &path,
            &[sinf(0, b"primary-license"), sinf(7, b"extra-license")],
            &Value::Null,
        )
        .await
        .expect("inject");

        assert_eq!(
            read_entry(&path, "Payload/Demo.app/SC_Info/Demo.sinf"),
            b"primary-license"
        );
        assert_eq!(
            read_entry(&path, "Payload/Demo.app/SC_Info/Demo.7.sinf"),
            b"extra-license"
        );
        // original entries survive the append
        assert_eq!(read_entry(&path, "Payload/Demo.app/Info.plist"), b"<plist/>");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn writes_metadata_plist_at_archive_root() {
        let path = temp_archive("metadata");
        write_app_archive(&path);

        inject(
            &path,
            &[sinf(0, b"lic")],
            &serde_json::json!({"itemName": "Demo", "itemId": 42}),
        )
        .await
        .expect("inject");

        let plist = String::from_utf8(read_entry(&path, "iTunesMetadata.plist")).expect("utf8");
        assert!(plist.contains("<key>itemName</key>"));
        assert!(plist.contains("<integer>42</integer>"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn null_metadata_is_skipped() {
        let path = temp_archive("no-metadata");
        write_app_archive(&path);

        inject(&path, &[sinf(0, b"lic")], &Value::Null)
            .await
            .expect("inject");

        let file = std::fs::File::open(&path).expect("open");
        let zip = ZipArchive::new(file).expect("zip");
        assert!(!zip.file_names().any(|n| n == "iTunesMetadata.plist"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rejects_non_zip_input() {
        let path = temp_archive("not-zip");
        std::fs::write(&path, b"this is not an archive").expect("write");

        let err = inject(&path, &[sinf(0, b"lic")], &Value::Null)
            .await
            .expect_err("must fail");
        assert!(matches!(err, InjectError::MalformedArchive(_)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rejects_archive_without_app_bundle() {
        let path = temp_archive("no-bundle");
        let file = std::fs::File::create(&path).expect("create");
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("README.txt", SimpleFileOptions::default())
            .expect("entry");
        writer.write_all(b"hello").expect("write");
        writer.finish().expect("finish");

        let err = inject(&path, &[sinf(0, b"lic")], &Value::Null)
            .await
            .expect_err("must fail");
        assert!(matches!(err, InjectError::MalformedArchive(_)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn rejects_undecodable_license_record() {
        let path = temp_archive("bad-b64");
        write_app_archive(&path);

        let err = inject(
            &path,
            &[SinfRecord {
                id: 3,
                sinf: "!!!not-base64!!!".to_string(),
            }],
            &Value::Null,
        )
        .await
        .expect_err("must fail");
        assert!(matches!(err, InjectError::BadLicenseRecord { id: 3 }));
        let _ = std::fs::remove_file(path);
    }
}
