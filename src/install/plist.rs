//! Minimal JSON to XML property-list rendering, enough for install
//! manifests and embedded metadata blobs.

use serde_json::Value;

pub const PLIST_HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
    "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    "<plist version=\"1.0\">\n"
);
pub const PLIST_FOOTER: &str = "</plist>\n";

/// Renders a JSON value as a complete plist document.
pub fn to_plist_xml(value: &Value) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(PLIST_HEADER);
    render_value(value, &mut out, 0);
    out.push_str(PLIST_FOOTER);
    out
}

fn render_value(value: &Value, out: &mut String, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        Value::Null => {
            out.push_str(&pad);
            out.push_str("<string></string>\n");
        }
        Value::Bool(true) => {
            out.push_str(&pad);
            out.push_str("<true/>\n");
        }
        Value::Bool(false) => {
            out.push_str(&pad);
            out.push_str("<false/>\n");
        }
        Value::Number(n) => {
            out.push_str(&pad);
            if n.is_i64() || n.is_u64() {
                out.push_str(&format!("<integer>{n}</integer>\n"));
            } else {
                out.push_str(&format!("<real>{n}</real>\n"));
            }
        }
        Value::String(s) => {
            out.push_str(&pad);
            out.push_str(&format!("<string>{}</string>\n", escape_xml(s)));
        }
        Value::Array(items) => {
            out.push_str(&pad);
            out.push_str("<array>\n");
            for item in items {
                render_value(item, out, depth + 1);
            }
            out.push_str(&pad);
            out.push_str("</array>\n");
        }
        Value::Object(map) => {
            out.push_str(&pad);
            out.push_str("<dict>\n");
            for (key, item) in map {
                out.push_str(&"  ".repeat(depth + 1));
                out.push_str(&format!("<key>{}</key>\n", escape_xml(key)));
                render_value(item, out, depth + 1);
            }
            out.push_str(&pad);
            out.push_str("</dict>\n");
        }
    }
}

pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
