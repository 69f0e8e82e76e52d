//! Line-addressed project file engine.
//!
//! A [`Workspace`] maps `/`-separated relative paths to [`LineStore`]s and mirrors
//! every mutation to a backing directory. Model output is decoded into an
//! [`InstructionSet`] whose items are applied independently: file writes are
//! create-or-overwrite, patches address single lines of files the workspace
//! already knows.

pub mod instruction;
pub mod line_store;
pub mod workspace;

pub use instruction::{
    decode, DecodeError, Decoded, FilePatch, FileWrite, InstructionSet, InvalidItem,
    PatchInstruction,
};
pub use line_store::{LineError, LineStore, Replacement};
pub use workspace::{
    normalize_relative_path, PatchReport, PatchWarning, PatchWarningKind, Workspace,
    WorkspaceError,
};
