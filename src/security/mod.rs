//! Security core: injection scanning, truth verification, untrusted
//! content wrapping, the command gate, and the post-generation audit.

pub mod auditor;
pub mod scanner;
pub mod tool_guard;
pub mod truth;
pub mod wrapper;

pub use auditor::{AuditVerdict, ResponseAuditor, Severity, Violation, ViolationKind};
pub use scanner::{MatchEvidence, PatternRule, ScanResult, ThreatLevel, ThreatScanner};
pub use tool_guard::{
    parse_command_tags, CommandTag, DangerousToolKind, GateDecision, ToolGuard, ToolMatch,
    ToolScan,
};
pub use truth::{ContradictionRule, CoreTruth, TruthTable, Verdict};
pub use wrapper::ContentQuarantineWrapper;
