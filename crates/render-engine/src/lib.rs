//! Dreamcloud Render Engine
//!
//! Turns an editing timeline into a project document for the external MLT
//! renderer (melt) and supervises the render processes it spawns.
//!
//! # Pipeline Architecture
//!
//! ```text
//! Timeline ──► XML Generator ──► XML Validator
//!                                     │
//!                         Engine Availability Check
//!                                     │
//!                          Temp Workspace + project.mlt
//!                                     │
//!                            melt process (spawned)
//!                                     │
//!                  progress stream ──► RenderProgress events
//!                                     │
//!                   Completed / Failed / Cancelled + cleanup
//! ```
//!
//! The [`manager::RenderJobManager`] is the public entry point; everything
//! else is a leaf it composes.

pub mod engine;
pub mod generator;
pub mod job;
pub mod manager;
pub mod progress;
pub mod temp;
pub mod validator;

pub use engine::{EngineChecker, MeltCheckResult};
pub use generator::{generate_project_xml, generate_project_xml_for_range};
pub use job::{RenderJob, RenderKind, RenderOptions, RenderStatus};
pub use manager::RenderJobManager;
pub use progress::RenderProgress;
pub use temp::TempResourceManager;
pub use validator::validate_project_xml;
