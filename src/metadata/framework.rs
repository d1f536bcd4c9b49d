//! Target framework names.
//!
//! Framework tokens appear in two shapes: short folder names used inside the
//! package (`lib/net45/`, `lib/netstandard2.0/`) and the long form used in
//! manifests (`.NETFramework,Version=v4.5`). Both normalize to the long form.

use std::fmt;

const NATIVE: &str = "native";

/// Package folders whose first child directory names a target framework.
const FRAMEWORK_ROOTS: [&str; 4] = ["lib", "content", "build", "tools"];

/// A normalized target framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameworkName {
    identifier: String,
    version: Option<String>,
}

impl FrameworkName {
    /// Framework identifier, e.g. `.NETStandard`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Dotted framework version, `None` for `native`.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Parses a short or long framework token. Unknown frameworks yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        if let Some((identifier, rest)) = token.split_once(',') {
            let version = rest
                .trim()
                .strip_prefix("Version=")?
                .trim_start_matches(['v', 'V']);
            let identifier = long_identifier(identifier.trim())?;
            return Some(Self {
                identifier: identifier.to_string(),
                version: Some(dotted_version(version)?),
            });
        }

        let lower = token.to_ascii_lowercase();
        if lower == NATIVE {
            return Some(Self {
                identifier: NATIVE.to_string(),
                version: None,
            });
        }

        let split = lower.find(|c: char| c.is_ascii_digit())?;
        let (short, version) = lower.split_at(split);
        let version = short_version(version)?;
        let major: u32 = version.split('.').next()?.parse().ok()?;

        let identifier = match short.trim_start_matches('.') {
            // net5.0 and later continue the .NET Core line.
            "net" if major >= 5 => ".NETCoreApp",
            "net" => ".NETFramework",
            "netcoreapp" => ".NETCoreApp",
            "netstandard" => ".NETStandard",
            "netcore" | "win" => ".NETCore",
            "uap" => "UAP",
            "sl" => "Silverlight",
            "wp" => "WindowsPhone",
            "netframework" => ".NETFramework",
            _ => return None,
        };

        Some(Self {
            identifier: identifier.to_string(),
            version: Some(version),
        })
    }

    /// Infers the framework from a package path such as `lib/net45/App.dll`.
    ///
    /// Files placed directly in a framework root carry no framework.
    pub fn from_package_path(path: &str) -> Option<Self> {
        let mut segments = path.split(['/', '\\']).filter(|s| !s.is_empty());
        let root = segments.next()?;
        if !FRAMEWORK_ROOTS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(root))
        {
            return None;
        }
        let folder = segments.next()?;
        // The folder must be a directory, not the file itself.
        segments.next()?;
        Self::parse(folder)
    }
}

impl fmt::Display for FrameworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{},Version=v{}", self.identifier, version),
            None => f.write_str(&self.identifier),
        }
    }
}

fn long_identifier(identifier: &str) -> Option<&'static str> {
    const KNOWN: [&str; 7] = [
        ".NETFramework",
        ".NETCoreApp",
        ".NETStandard",
        ".NETCore",
        "UAP",
        "Silverlight",
        "WindowsPhone",
    ];
    KNOWN
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(identifier))
}

/// `45` -> `4.5`, `451` -> `4.5.1`, `6.0` -> `6.0`, `4` -> `4.0`
fn short_version(text: &str) -> Option<String> {
    if text.contains('.') {
        return dotted_version(text);
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parts: Vec<String> = text.chars().map(String::from).collect();
    if parts.len() == 1 {
        Some(format!("{}.0", parts[0]))
    } else {
        Some(parts.join("."))
    }
}

fn dotted_version(text: &str) -> Option<String> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.is_empty()
        || parts.len() > 4
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    if parts.len() == 1 {
        Some(format!("{}.0", parts[0]))
    } else {
        Some(parts.join("."))
    }
}
