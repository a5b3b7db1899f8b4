//! Shell probe protocol.
//!
//! A probe is a shell command whose only job is to print one line of
//! diagnostic output. Several probes are joined into one shell invocation
//! and the combined stdout is split back into results.
//!
//! The positional helpers [`create_shell_cmd`] and [`parse_cmd_result`]
//! rely on every probe printing exactly one line. [`ProbeBatch`] tags each
//! line with its probe id instead, so a silent or chatty probe cannot shift
//! the others.

use std::collections::HashMap;

use crate::config::Platform;

/// Separator between a probe id and its value.
pub const TAG_SEPARATOR: char = '=';

/// Join fragments into one shell line: `a;b;c;`.
#[must_use]
pub fn create_shell_cmd<S: AsRef<str>>(fragments: &[S]) -> String {
    let mut line = fragments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(";");
    line.push(';');
    line
}

/// Split raw output into non-empty lines, normalizing CRLF.
#[must_use]
pub fn parse_cmd_result(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .replace("\r\n", "\n")
        .split('\n')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// A single tagged probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Key the result is reported under.
    pub id: String,
    /// Shell command whose first output line is the value.
    pub command: String,
}

/// Ordered set of probes run in one shell invocation.
#[derive(Debug, Clone)]
pub struct ProbeBatch {
    platform: Platform,
    probes: Vec<Probe>,
}

impl ProbeBatch {
    /// Create an empty batch targeting `platform`'s shell.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            probes: Vec::new(),
        }
    }

    /// Add a probe.
    #[must_use]
    pub fn probe(mut self, id: impl Into<String>, command: impl Into<String>) -> Self {
        self.probes.push(Probe {
            id: id.into(),
            command: command.into(),
        });
        self
    }

    /// The probes in submission order.
    #[must_use]
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Number of probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether the batch has no probes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Render one probe so its output lines carry the `id=` tag.
    fn tagged(&self, probe: &Probe) -> String {
        if self.platform == Platform::Windows {
            let inner = probe.command.replace('>', "^>").replace('&', "^&");
            format!(
                "for /f \"delims=\" %i in ('{inner} 2^>nul') do @echo {}{TAG_SEPARATOR}%i",
                probe.id
            )
        } else {
            format!(
                "printf '%s{TAG_SEPARATOR}%s\\n' {} \"$({} 2>/dev/null)\"",
                shell_escape::unix::escape(probe.id.as_str().into()),
                probe.command
            )
        }
    }

    /// The single shell line running every probe.
    #[must_use]
    pub fn shell_command(&self) -> String {
        let fragments: Vec<String> = self.probes.iter().map(|p| self.tagged(p)).collect();
        if self.platform == Platform::Windows {
            fragments.join(" & ")
        } else {
            create_shell_cmd(&fragments)
        }
    }

    /// Collect tagged lines from `raw` output.
    ///
    /// The first non-empty value per id wins; untagged lines, unknown ids,
    /// and empty values are ignored.
    #[must_use]
    pub fn parse(&self, raw: &[u8]) -> ProbeResults {
        let mut values = HashMap::new();
        for line in parse_cmd_result(raw) {
            let Some((id, value)) = line.split_once(TAG_SEPARATOR) else {
                tracing::trace!(line = %line, "Skipping untagged probe output");
                continue;
            };
            let value = value.trim();
            if value.is_empty() || !self.probes.iter().any(|p| p.id == id) {
                continue;
            }
            values
                .entry(id.to_string())
                .or_insert_with(|| value.to_string());
        }
        ProbeResults { values }
    }
}

/// Probe values keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResults {
    values: HashMap<String, String>,
}

impl ProbeResults {
    /// Value reported for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    /// Owned value reported for `id`, if any.
    #[must_use]
    pub fn take(&mut self, id: &str) -> Option<String> {
        self.values.remove(id)
    }

    /// Number of probes that reported a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no probe reported a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
