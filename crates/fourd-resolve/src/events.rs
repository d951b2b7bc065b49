// crates/fourd-resolve/src/events.rs
//
// The resolve entry-point's event stream (spec §6). The original embeds a
// Python callback directly into a Deadline plugin process; across a process
// boundary the same six events become one line of JSON per event on
// stdout, which a farm driver wrapper reads and dispatches exactly the way
// the embedded callback did.

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lower")]
pub enum ResolveStage {
    Initialize,
    Resolve,
    Conversion,
    Export,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolveStage::Initialize => "initialize",
            ResolveStage::Resolve => "resolve",
            ResolveStage::Conversion => "conversion",
            ResolveStage::Export => "export",
        };
        f.write_str(label)
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveEvent {
    Complete,
    Fail { message: String },
    LogInfo { message: String },
    LogStdout { message: String },
    LogWarning { message: String },
    Progress { percent: f64 },
}

impl ResolveEvent {
    /// Emits one line of JSON to stdout, flushing immediately so a wrapper
    /// process reading line-by-line never stalls behind stdio buffering.
    pub fn emit(&self) {
        use std::io::Write;
        if let Ok(json) = serde_json::to_string(self) {
            println!("{json}");
            let _ = std::io::stdout().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_matches_cli_value_names() {
        assert_eq!(ResolveStage::Initialize.to_string(), "initialize");
        assert_eq!(ResolveStage::Export.to_string(), "export");
    }

    #[test]
    fn events_serialize_with_a_kind_tag() {
        let json = serde_json::to_string(&ResolveEvent::Progress { percent: 42.5 }).unwrap();
        assert_eq!(json, r#"{"kind":"progress","percent":42.5}"#);

        let json = serde_json::to_string(&ResolveEvent::Complete).unwrap();
        assert_eq!(json, r#"{"kind":"complete"}"#);
    }
}
