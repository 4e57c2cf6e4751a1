//! Artifact fingerprints.
//!
//! A fingerprint summarises one compiled JavaScript artifact into the pieces
//! the reload decision compares: program kind, the `init` / `update` /
//! `view` / `subscriptions` functions, the flags decoder, the port set,
//! debugger metadata and (optimized builds) the record field set that
//! determines name mangling.
//!
//! Extraction is textual. Compiled output has a stable layout: one
//! `var $pkg$Module$name = ...;` per top-level definition, a `main`
//! definition wrapping a record, and a final `_Platform_export({...})`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::cache::PersistedFingerprint;
use crate::core::CompilationMode;
use crate::utils::hash;

/// Top-level program constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Sandbox,
    Element,
    Document,
    Application,
    Worker,
    Unknown,
}

impl ProgramKind {
    fn from_constructor(name: &str) -> Self {
        match name {
            "sandbox" => Self::Sandbox,
            "element" => Self::Element,
            "document" => Self::Document,
            "application" => Self::Application,
            "worker" => Self::Worker,
            _ => Self::Unknown,
        }
    }

    pub fn has_view(self) -> bool {
        !matches!(self, Self::Worker)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sandbox => "Browser.sandbox",
            Self::Element => "Browser.element",
            Self::Document => "Browser.document",
            Self::Application => "Browser.application",
            Self::Worker => "Platform.worker",
            Self::Unknown => "unknown program",
        }
    }
}

/// Port name with direction, e.g. `out:sendMessage`.
pub type PortName = String;

/// Summary of one compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// blake3 hex of the whole artifact
    pub hash: String,
    /// One entry per exported program, in output order
    pub programs: Vec<ProgramKind>,
    pub init: Option<u64>,
    pub update: Option<u64>,
    pub view: Option<u64>,
    pub subscriptions: Option<u64>,
    pub flags: Option<u64>,
    pub ports: BTreeSet<PortName>,
    /// Debug builds only
    pub debug_metadata: Option<u64>,
    /// Optimized builds only
    pub mangling: Option<u64>,
}

static MAIN_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^var (\$[\w$]*\$main) = \$elm\$(?:browser\$Browser|core\$Platform)\$(sandbox|element|document|application|worker)\(",
    )
    .unwrap()
});

static PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"_Platform_(incoming|outgoing)Port\(\s*['"]([^'"]+)['"]"#).unwrap()
});

static INITIALIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"_Platform_initialize\(\s*flagDecoder,\s*args,\s*impl\.([\w$]+),\s*impl\.([\w$]+),\s*impl\.([\w$]+)",
    )
    .unwrap()
});

static VIEW_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var view = impl\.([\w$]+);").unwrap());

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z_][\w$]*").unwrap());

static RECORD_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{,]\s*([A-Za-z_$][\w$]*)\s*:").unwrap());

/// Record keys of the four program functions, as they appear in this build.
struct FieldKeys {
    init: String,
    update: String,
    subscriptions: String,
    view: String,
}

impl FieldKeys {
    /// Optimized builds rename record fields; the kernel's own use of the
    /// program record reveals the mapping. Falls back to plain names.
    fn resolve(code: &str) -> Self {
        let mut keys = Self {
            init: "init".into(),
            update: "update".into(),
            subscriptions: "subscriptions".into(),
            view: "view".into(),
        };
        if let Some(caps) = INITIALIZE.captures(code) {
            keys.init = caps[1].to_string();
            keys.update = caps[2].to_string();
            keys.subscriptions = caps[3].to_string();
        }
        if let Some(caps) = VIEW_FIELD.captures(code) {
            keys.view = caps[1].to_string();
        }
        keys
    }
}

impl Fingerprint {
    /// Summarise compiled output built in `mode`.
    pub fn extract(code: &str, mode: CompilationMode) -> Self {
        let keys = FieldKeys::resolve(code);

        let mut programs = Vec::new();
        let mut parts: [Vec<String>; 4] = Default::default();
        for caps in MAIN_DEF.captures_iter(code) {
            programs.push(ProgramKind::from_constructor(&caps[2]));

            let Some(whole) = caps.get(0) else { continue };
            let Some(argument) = balanced(code, whole.end() - 1) else {
                continue;
            };
            let record = argument.trim();
            let Some(body) = record.strip_prefix('{').and_then(|r| r.strip_suffix('}')) else {
                continue;
            };
            for (key, value) in record_fields(body) {
                let slot = if key == keys.init {
                    0
                } else if key == keys.update {
                    1
                } else if key == keys.view {
                    2
                } else if key == keys.subscriptions {
                    3
                } else {
                    continue;
                };
                parts[slot].push(expression_with_definitions(code, value));
            }
        }

        let combine = |items: &[String]| -> Option<u64> {
            (!items.is_empty()).then(|| hash::compute_parts(items.iter().map(String::as_str)))
        };

        let (flags, debug_metadata) = export_arguments(code);

        Self {
            hash: hash::content_hash(code.as_bytes()),
            programs,
            init: combine(&parts[0]),
            update: combine(&parts[1]),
            view: combine(&parts[2]),
            subscriptions: combine(&parts[3]),
            flags,
            ports: PORT
                .captures_iter(code)
                .map(|caps| {
                    let direction = if &caps[1] == "incoming" { "in" } else { "out" };
                    format!("{direction}:{}", &caps[2])
                })
                .collect(),
            debug_metadata: debug_metadata.filter(|_| mode == CompilationMode::Debug),
            mangling: (mode == CompilationMode::Optimize).then(|| mangling_signature(code)),
        }
    }

    pub fn has_view(&self) -> bool {
        self.programs.iter().any(|p| p.has_view())
    }

    /// Hash of the port set.
    pub fn ports_hash(&self) -> u64 {
        hash::compute_parts(self.ports.iter().map(String::as_str))
    }

    /// The subset that is stored across restarts.
    pub fn to_persisted(&self) -> PersistedFingerprint {
        PersistedFingerprint {
            hash: self.hash.clone(),
            debug_metadata: self.debug_metadata,
            ports: self.ports_hash(),
        }
    }
}

/// Hash the flags decoder and debug metadata passed to every exported
/// `main` in `_Platform_export({'Main':{'init':$main(<flags>)(<debug>)}})`.
fn export_arguments(code: &str) -> (Option<u64>, Option<u64>) {
    let Some(start) = code.rfind("_Platform_export(") else {
        return (None, None);
    };
    let export = &code[start..];

    let mut flags = Vec::new();
    let mut debug = Vec::new();
    let mut offset = 0;
    while let Some(found) = export[offset..].find("$main(") {
        let open = offset + found + "$main".len();
        let Some(decoder) = balanced(export, open) else { break };
        flags.push(decoder.trim().to_string());

        let after = open + decoder.len() + 2;
        if export[after..].starts_with('(')
            && let Some(metadata) = balanced(export, after)
        {
            let metadata = metadata.trim();
            if metadata.starts_with('{') {
                debug.push(metadata.to_string());
            }
        }
        offset = after;
    }

    let combine = |items: &[String]| {
        (!items.is_empty()).then(|| hash::compute_parts(items.iter().map(String::as_str)))
    };
    (combine(&flags), combine(&debug))
}

/// Set of record keys in the artifact. In optimized builds every field name
/// is shortened consistently program-wide, so adding a field anywhere can
/// shift the names of others.
fn mangling_signature(code: &str) -> u64 {
    let keys: BTreeSet<&str> = RECORD_KEY
        .captures_iter(code)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    hash::compute_parts(keys)
}

/// A field value plus the top-level definitions it references, so that
/// `update: $author$project$Main$update` changes when the function body does.
fn expression_with_definitions(code: &str, expression: &str) -> String {
    let mut out = expression.trim().to_string();
    let mut seen = FxHashSet::default();
    for ident in IDENT.find_iter(expression) {
        let name = ident.as_str();
        if seen.insert(name)
            && let Some(definition) = definition(code, name)
        {
            out.push('\n');
            out.push_str(definition);
        }
    }
    out
}

/// Text of `var <name> = ...` up to the next top-level definition.
fn definition<'a>(code: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("var {name} = ");
    let start = if code.starts_with(&needle) {
        0
    } else {
        code.find(&format!("\n{needle}"))? + 1
    };
    let rest = &code[start..];
    let end = ["\nvar ", "\nfunction ", "\n_Platform_export("]
        .iter()
        .filter_map(|marker| rest[1..].find(marker).map(|i| i + 1))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Split `key: value, key: value` at top-level commas.
fn record_fields(body: &str) -> Vec<(&str, &str)> {
    let mut fields = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                if let Some(field) = split_field(&body[start..i]) {
                    fields.push(field);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(field) = split_field(&body[start..]) {
        fields.push(field);
    }
    fields
}

fn split_field(segment: &str) -> Option<(&str, &str)> {
    let (key, value) = segment.split_once(':')?;
    Some((key.trim().trim_matches(|c| c == '\'' || c == '"'), value))
}

/// Contents between the bracket at `open` and its match.
///
/// String literals are skipped so brackets inside them do not count.
fn balanced(code: &str, open: usize) -> Option<&str> {
    let bytes = code.as_bytes();
    let (opening, closing) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else if matches!(b, b'\'' | b'"' | b'`') {
            quote = Some(b);
        } else if b == opening {
            depth += 1;
        } else if b == closing {
            depth -= 1;
            if depth == 0 {
                return code.get(open + 1..i);
            }
        }
        i += 1;
    }
    None
}
