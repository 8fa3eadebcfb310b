pub mod adapters;
pub mod audit_store;
pub mod detect;
pub mod diff;
pub mod document;
pub mod engine;
pub mod error;
pub mod guard;
pub mod manifest;
pub mod models;
pub mod paths;

pub use adapters::{AdapterRegistry, EnvValue, MergeOptions, MergeOutcome, RemoveOutcome, ToolAdapter};
pub use audit_store::{RegisterAuditStore, DEFAULT_AUDIT_LOG_LIMIT};
pub use detect::{RegisterEngineEnvironment, ToolDetector, KNOWN_TOOL_IDS};
pub use document::{ConfigDocument, DocumentError, TextEdit};
pub use engine::{ApplyOptions, RegisterEngine, RemoveOptions};
pub use error::{ManifestViolation, RegisterEngineError};
pub use manifest::{
    ManifestEnvVar, ManifestHttp, ManifestStdio, RegisterManifest, TargetToolsFilter,
    MANIFEST_FILE_NAME, SUPPORTED_MANIFEST_VERSION,
};
pub use models::{
    AuditEvent, AuditEventStatus, DetectedTool, DetectionConfidence, RegisterResult,
    SkippedTarget, StatusReport, ToolScope, ToolStatus, Transport, WriteAction, WriteResult,
};
pub use paths::RegisterPaths;
