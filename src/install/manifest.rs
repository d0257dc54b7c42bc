//! OTA install manifest for the on-device installer: a plist pointing the
//! device at the signed payload, plus the `itms-services://` link that makes
//! the platform fetch it.

use serde_json::Value;

use crate::install::plist::{escape_xml, PLIST_FOOTER, PLIST_HEADER};

/// Served for the icon routes. Devices require both icon assets to exist
/// before they start an install; a blank placeholder satisfies them.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78, 0xDA, 0x63, 0xF8,
    0x0F, 0x04, 0x00, 0x09, 0xFB, 0x03, 0xFD, 0x68, 0xFA, 0x1C, 0xCC, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn software_str<'a>(software: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    software.get(key).and_then(Value::as_str).unwrap_or(fallback)
}

/// Builds the install manifest plist. `software` is the metadata blob stored
/// on the task; the bundle id, version, and display name come from it, with
/// neutral fallbacks so a sparse blob still yields an installable manifest.
pub fn build_manifest(
    software: &Value,
    payload_url: &str,
    small_icon_url: &str,
    large_icon_url: &str,
) -> String {
    let bundle_id = software_str(software, "bundleId", "unknown.bundle");
    let version = software_str(software, "version", "1.0");
    let title = software_str(software, "name", "App");

    let mut out = String::with_capacity(1024);
    out.push_str(PLIST_HEADER);
    out.push_str("<dict>\n");
    out.push_str("  <key>items</key>\n");
    out.push_str("  <array>\n");
    out.push_str("    <dict>\n");
    out.push_str("      <key>assets</key>\n");
    out.push_str("      <array>\n");
    push_asset(&mut out, "software-package", payload_url);
    push_asset(&mut out, "display-image", small_icon_url);
    push_asset(&mut out, "full-size-image", large_icon_url);
    out.push_str("      </array>\n");
    out.push_str("      <key>metadata</key>\n");
    out.push_str("      <dict>\n");
    push_kv(&mut out, "bundle-identifier", bundle_id);
    push_kv(&mut out, "bundle-version", version);
    push_kv(&mut out, "kind", "software");
    push_kv(&mut out, "title", title);
    out.push_str("      </dict>\n");
    out.push_str("    </dict>\n");
    out.push_str("  </array>\n");
    out.push_str("</dict>\n");
    out.push_str(PLIST_FOOTER);
    out
}

fn push_asset(out: &mut String, kind: &str, url: &str) {
    out.push_str("        <dict>\n");
    out.push_str(&format!(
        "          <key>kind</key>\n          <string>{}</string>\n",
        escape_xml(kind)
    ));
    out.push_str(&format!(
        "          <key>url</key>\n          <string>{}</string>\n",
        escape_xml(url)
    ));
    out.push_str("        </dict>\n");
}

fn push_kv(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!(
        "        <key>{}</key>\n        <string>{}</string>\n",
        escape_xml(key),
        escape_xml(value)
    ));
}

/// The link a device opens to trigger the OTA install. The manifest URL must
/// be percent-encoded in full, it rides inside a query parameter.
pub fn install_link(manifest_url: &str) -> String {
    format!(
        "itms-services://?action=download-manifest&url={}",
        urlencoding::encode(manifest_url)
    )
}

pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_binds_metadata_to_payload() {
        let xml = build_manifest(
            &json!({"bundleId": "com.example.demo", "version": "2.1.0", "name": "Demo App"}),
            "https://host/api/install/abc/payload.ipa",
            "https://host/api/install/abc/icon-small.png",
            "https://host/api/install/abc/icon-large.png",
        );
        assert!(xml.contains("<string>software-package</string>"));
        assert!(xml.contains("<string>https://host/api/install/abc/payload.ipa</string>"));
        assert!(xml.contains("<string>com.example.demo</string>"));
        assert!(xml.contains("<string>2.1.0</string>"));
        assert!(xml.contains("<string>Demo App</string>"));
        assert!(xml.contains("<string>display-image</string>"));
        assert!(xml.contains("<string>full-size-image</string>"));
        assert!(xml.starts_with("<?xml version=\"1.0\""));
    }

    #[test]
    fn manifest_survives_sparse_software_blob() {
        let xml = build_manifest(&json!({}), "https://h/p.ipa", "https://h/s.png", "https://h/l.png");
        assert!(xml.contains("<string>unknown.bundle</string>"));
        assert!(xml.contains("<string>App</string>"));
    }

    #[test]
    fn manifest_escapes_titles() {
        let xml = build_manifest(
            &json!({"name": "Tom & Jerry <II>"}),
            "https://h/p.ipa",
            "https://h/s.png",
            "https://h/l.png",
        );
        assert!(xml.contains("Tom &amp; Jerry &lt;II&gt;"));
    }

    #[test]
    fn install_link_percent_encodes_the_manifest_url() {
        let link = install_link("https://host/api/install/abc/manifest.plist");
        assert_eq!(
            link,
            "itms-services://?action=download-manifest&url=https%3A%2F%2Fhost%2Fapi%2Finstall%2Fabc%2Fmanifest.plist"
        );
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://h", "a/b"), "https://h/a/b");
        assert_eq!(join_url("https://h/", "/a/b"), "https://h/a/b");
    }

    #[test]
    fn placeholder_icon_is_a_png() {
        assert_eq!(&PLACEHOLDER_PNG[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(&PLACEHOLDER_PNG[PLACEHOLDER_PNG.len() - 8..][..4], b"IEND");
    }
}
