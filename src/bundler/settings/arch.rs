//! Machine architectures and package architecture resolution.

use std::fmt;

/// Machine architecture a release is tagged with.
///
/// Values come from the machine field reported for each update-aware
/// executable. Codes the tool does not know map to [`RuntimeCpu::Unknown`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeCpu {
    /// Not detected.
    #[default]
    Unknown,
    /// 32-bit x86.
    X86,
    /// x86-64 / AMD64.
    X64,
    /// ARM64.
    Arm64,
}

/// Resolution order. Hosts that run a later architecture usually emulate the
/// earlier ones, so the first match is the most widely installable.
pub const ARCHITECTURE_PREFERENCE: [RuntimeCpu; 3] =
    [RuntimeCpu::X86, RuntimeCpu::X64, RuntimeCpu::Arm64];

impl RuntimeCpu {
    /// `IMAGE_FILE_MACHINE_I386`
    pub const MACHINE_I386: u16 = 0x014c;
    /// `IMAGE_FILE_MACHINE_AMD64`
    pub const MACHINE_AMD64: u16 = 0x8664;
    /// `IMAGE_FILE_MACHINE_ARM64`
    pub const MACHINE_ARM64: u16 = 0xaa64;

    /// Maps a reported machine code.
    pub fn from_machine(code: u16) -> Self {
        match code {
            Self::MACHINE_I386 => Self::X86,
            Self::MACHINE_AMD64 => Self::X64,
            Self::MACHINE_ARM64 => Self::Arm64,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name as written into manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for RuntimeCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal conditions found while resolving the architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ArchitectureWarning {
    /// Binaries disagree; the preferred one was picked.
    MultipleArchitectures(Vec<RuntimeCpu>),
    /// No known architecture was reported.
    Undetected,
}

impl fmt::Display for ArchitectureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleArchitectures(found) => {
                let names: Vec<&str> = found.iter().map(|cpu| cpu.as_str()).collect();
                write!(
                    f,
                    "multiple update-aware binaries with different machine architectures: {}",
                    names.join(", ")
                )
            }
            Self::Undetected => {
                f.write_str("unable to detect package machine architecture from update-aware binaries")
            }
        }
    }
}

/// Outcome of [`resolve_architecture`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchitectureResolution {
    /// Chosen architecture; `Unknown` when nothing was detected.
    pub architecture: RuntimeCpu,
    /// Distinct known candidates in preference order.
    pub candidates: Vec<RuntimeCpu>,
    /// Warnings to surface.
    pub warnings: Vec<ArchitectureWarning>,
}

/// Chooses the package architecture from reported machine codes.
///
/// The result depends only on the set of codes, never on their order.
pub fn resolve_architecture<I>(machine_codes: I) -> ArchitectureResolution
where
    I: IntoIterator<Item = u16>,
{
    let reported: Vec<RuntimeCpu> = machine_codes
        .into_iter()
        .map(RuntimeCpu::from_machine)
        .filter(|cpu| *cpu != RuntimeCpu::Unknown)
        .collect();

    let candidates: Vec<RuntimeCpu> = ARCHITECTURE_PREFERENCE
        .into_iter()
        .filter(|cpu| reported.contains(cpu))
        .collect();

    let mut warnings = Vec::new();
    if candidates.len() > 1 {
        warnings.push(ArchitectureWarning::MultipleArchitectures(candidates.clone()));
    }

    let architecture = match candidates.first() {
        Some(cpu) => *cpu,
        None => {
            warnings.push(ArchitectureWarning::Undetected);
            RuntimeCpu::Unknown
        }
    };

    ArchitectureResolution {
        architecture,
        candidates,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_architecture_wins() {
        let resolved =
            resolve_architecture([RuntimeCpu::MACHINE_AMD64, RuntimeCpu::MACHINE_I386]);
        assert_eq!(resolved.architecture, RuntimeCpu::X86);
        assert_eq!(
            resolved.warnings,
            vec![ArchitectureWarning::MultipleArchitectures(vec![
                RuntimeCpu::X86,
                RuntimeCpu::X64
            ])]
        );
    }

    #[test]
    fn empty_is_unknown_with_warning() {
        let resolved = resolve_architecture([]);
        assert_eq!(resolved.architecture, RuntimeCpu::Unknown);
        assert_eq!(resolved.warnings, vec![ArchitectureWarning::Undetected]);
    }

    #[test]
    fn unknown_codes_are_discarded() {
        let resolved = resolve_architecture([0x01c4, RuntimeCpu::MACHINE_ARM64, 0]);
        assert_eq!(resolved.architecture, RuntimeCpu::Arm64);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn duplicates_do_not_warn() {
        let resolved =
            resolve_architecture([RuntimeCpu::MACHINE_AMD64, RuntimeCpu::MACHINE_AMD64]);
        assert_eq!(resolved.architecture, RuntimeCpu::X64);
        assert!(resolved.warnings.is_empty());
    }
}
