//! Header classification table.
//!
//! Layers above the engine use this to decide whether repeated occurrences
//! of a header may be comma-joined into one value. The parser and the
//! serializer never consult it.

use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Repeated occurrences may be joined with `", "`.
    pub foldable: bool,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "Accept", foldable: true },
    FieldSpec { name: "Accept-Charset", foldable: true },
    FieldSpec { name: "Accept-Encoding", foldable: true },
    FieldSpec { name: "Accept-Language", foldable: true },
    FieldSpec { name: "Accept-Ranges", foldable: true },
    FieldSpec { name: "Age", foldable: false },
    FieldSpec { name: "Allow", foldable: true },
    FieldSpec { name: "Authorization", foldable: false },
    FieldSpec { name: "Cache-Control", foldable: true },
    FieldSpec { name: "Connection", foldable: true },
    FieldSpec { name: "Content-Encoding", foldable: true },
    FieldSpec { name: "Content-Language", foldable: true },
    FieldSpec { name: "Content-Length", foldable: false },
    FieldSpec { name: "Content-Location", foldable: false },
    FieldSpec { name: "Content-MD5", foldable: false },
    FieldSpec { name: "Content-Range", foldable: false },
    FieldSpec { name: "Content-Type", foldable: false },
    FieldSpec { name: "Cookie", foldable: false },
    FieldSpec { name: "Date", foldable: false },
    FieldSpec { name: "ETag", foldable: false },
    FieldSpec { name: "Expect", foldable: true },
    FieldSpec { name: "Expires", foldable: false },
    FieldSpec { name: "From", foldable: false },
    FieldSpec { name: "Host", foldable: false },
    FieldSpec { name: "If-Match", foldable: true },
    FieldSpec { name: "If-Modified-Since", foldable: false },
    FieldSpec { name: "If-None-Match", foldable: true },
    FieldSpec { name: "If-Range", foldable: false },
    FieldSpec { name: "If-Unmodified-Since", foldable: false },
    FieldSpec { name: "Last-Modified", foldable: false },
    FieldSpec { name: "Location", foldable: false },
    FieldSpec { name: "Max-Forwards", foldable: false },
    FieldSpec { name: "Pragma", foldable: true },
    FieldSpec { name: "Proxy-Authenticate", foldable: false },
    FieldSpec { name: "Proxy-Authorization", foldable: false },
    FieldSpec { name: "Range", foldable: false },
    FieldSpec { name: "Referer", foldable: false },
    FieldSpec { name: "Retry-After", foldable: false },
    FieldSpec { name: "Server", foldable: false },
    FieldSpec { name: "Set-Cookie", foldable: false },
    FieldSpec { name: "TE", foldable: true },
    FieldSpec { name: "Trailer", foldable: true },
    FieldSpec { name: "Transfer-Encoding", foldable: true },
    FieldSpec { name: "Upgrade", foldable: true },
    FieldSpec { name: "User-Agent", foldable: false },
    FieldSpec { name: "Vary", foldable: true },
    FieldSpec { name: "Via", foldable: true },
    FieldSpec { name: "Warning", foldable: true },
    FieldSpec { name: "WWW-Authenticate", foldable: false },
];

static REGISTRY: LazyLock<HashMap<String, &'static FieldSpec>> = LazyLock::new(|| {
    FIELDS
        .iter()
        .map(|spec| (spec.name.to_ascii_lowercase(), spec))
        .collect()
});

pub fn lookup(name: &str) -> Option<&'static FieldSpec> {
    REGISTRY.get(&name.to_ascii_lowercase()).copied()
}

/// Unknown headers are treated as not foldable.
pub fn is_foldable(name: &str) -> bool {
    lookup(name).is_some_and(|spec| spec.foldable)
}
