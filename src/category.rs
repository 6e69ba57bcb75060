//! The category registry: a closed set of media classes, each with its
//! storage subdirectory and content-type allow-list. Lookup only, no
//! runtime mutation.

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Images,
    Videos,
    Audio,
    Documents,
}

/// Per-category rules, fixed at compile time.
pub struct CategorySpec {
    pub id: Category,
    pub directory: &'static str,
    pub allowed_content_types: &'static [&'static str],
}

pub static REGISTRY: [CategorySpec; 4] = [
    CategorySpec {
        id: Category::Images,
        directory: "images",
        allowed_content_types: &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "image/svg+xml",
            "image/bmp",
        ],
    },
    CategorySpec {
        id: Category::Videos,
        directory: "videos",
        allowed_content_types: &[
            "video/mp4",
            "video/mpeg",
            "video/ogg",
            "video/webm",
            "video/quicktime",
        ],
    },
    CategorySpec {
        id: Category::Audio,
        directory: "audio",
        allowed_content_types: &[
            "audio/mpeg",
            "audio/ogg",
            "audio/wav",
            "audio/mp4",
            "audio/webm",
            "audio/aac",
        ],
    },
    CategorySpec {
        id: Category::Documents,
        directory: "documents",
        allowed_content_types: &[
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "text/plain",
            "application/rtf",
        ],
    },
];

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Documents,
    ];

    /// Case-insensitive lookup; `None` for anything outside the closed set.
    pub fn parse(value: &str) -> Option<Category> {
        match value.trim().to_ascii_lowercase().as_str() {
            "images" => Some(Category::Images),
            "videos" => Some(Category::Videos),
            "audio" => Some(Category::Audio),
            "documents" => Some(Category::Documents),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().directory
    }

    pub fn spec(self) -> &'static CategorySpec {
        match self {
            Category::Images => &REGISTRY[0],
            Category::Videos => &REGISTRY[1],
            Category::Audio => &REGISTRY[2],
            Category::Documents => &REGISTRY[3],
        }
    }

    /// Whether `content_type` is acceptable for this category.
    pub fn allows(self, content_type: &str) -> bool {
        self.spec()
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_known(value: &str) -> bool {
    Category::parse(value).is_some()
}
