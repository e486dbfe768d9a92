/// Number of messages fetched per history page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound a client may request for a single page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest accepted feed scope identifier
pub const MAX_SCOPE_ID_LEN: usize = 128;

/// Longest accepted message body, in bytes
pub const MAX_CONTENT_LEN: usize = 4_000;

/// Name of the channel every server is created with. Reserved.
pub const GENERAL_CHANNEL_NAME: &str = "general";

/// MIME type rendered as a document attachment rather than an image
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Live event names as they appear on the wire
pub const EVENT_MESSAGE_CREATED: &str = "message-created";
pub const EVENT_MESSAGE_UPDATED: &str = "message-updated";
pub const EVENT_MESSAGE_DELETED: &str = "message-deleted";
