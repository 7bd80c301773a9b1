//! Host windows: where a profile's game content is displayed.
//!
//! This module provides:
//! - The collaborator traits through which the windowing shell is queried (`collaborators`)
//! - Host resolution across standalone, multi-window and legacy topologies (`resolver`)
//! - An in-memory shell used by the command line tools and tests (`memory`)

pub mod collaborators;
pub mod memory;
pub mod resolver;

pub use collaborators::{
    InstanceRegistry, LegacySession, OverlayTargets, SessionEntry, SessionRegistry,
    SidePanelQuery, TabManager, WindowId, WindowQuery,
};
pub use memory::{MemoryDesktop, MemoryTabs, MemoryTargets};
pub use resolver::{
    HostDescriptor, HostProvider, HostResolver, LegacySessionProvider, SessionRegistryProvider,
    StandaloneWindowProvider,
};
