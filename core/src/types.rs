use strum_macros::Display;

pub const HTML_EXTENSION: &str = ".html";
pub const JSON_EXTENSION: &str = ".json";

/// Logical group of mirrored files. Each class is diffed and committed on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ContentClass {
    Posts,
    Pages,
    Media,
    General,
    ApiRequests,
    RemoteConfig,
}

impl ContentClass {
    /// Wordpress `wp/v2` object type, for classes mirroring one
    pub fn object_type(&self) -> Option<&'static str> {
        match self {
            ContentClass::Posts => Some("posts"),
            ContentClass::Pages => Some("pages"),
            ContentClass::Media => Some("media"),
            _ => None,
        }
    }
}
