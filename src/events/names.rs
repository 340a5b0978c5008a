//! Event names shared by the store, the tools and the host

// ============================================================================
// Annotation lifecycle
// ============================================================================

pub const ANNOTATION_CREATE_REQUESTED: &str = "annotation:create:requested";
pub const ANNOTATION_CREATED: &str = "annotation:created";
pub const ANNOTATION_CREATE_FAILED: &str = "annotation:create:failed";

pub const ANNOTATION_UPDATE_REQUESTED: &str = "annotation:update:requested";
pub const ANNOTATION_UPDATED: &str = "annotation:updated";
pub const ANNOTATION_UPDATE_FAILED: &str = "annotation:update:failed";

pub const ANNOTATION_DELETE_REQUESTED: &str = "annotation:delete:requested";
pub const ANNOTATION_DELETED: &str = "annotation:deleted";
pub const ANNOTATION_DELETE_FAILED: &str = "annotation:delete:failed";

pub const ANNOTATION_LOAD_REQUESTED: &str = "annotation:data:load:requested";
pub const ANNOTATION_LOADED: &str = "annotation:data:loaded";
pub const ANNOTATION_LOAD_FAILED: &str = "annotation:data:load:failed";

// ============================================================================
// Tools
// ============================================================================

pub const TOOL_ACTIVATE_REQUESTED: &str = "tool:activate:requested";
pub const TOOL_ACTIVATE_SUCCESS: &str = "tool:activate:success";
pub const TOOL_DEACTIVATE_REQUESTED: &str = "tool:deactivate:requested";
pub const TOOL_DEACTIVATE_SUCCESS: &str = "tool:deactivate:success";

// ============================================================================
// Host
// ============================================================================

pub const SELECTION_COMPLETED: &str = "selection:completed";
pub const PAGE_RENDERED: &str = "page:rendered";
pub const NAVIGATION_GOTO_REQUESTED: &str = "navigation:goto:requested";
pub const CLIPBOARD_COPY_REQUESTED: &str = "clipboard:copy:requested";
