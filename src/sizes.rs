//! Size classes and derivative kinds.
//!
//! Clients ask for derivatives by a one-letter size class (`s`, `m`, `l`).
//! Each [`DerivativeKind`] maps the class to pixel dimensions through a
//! [`SizeTable`] and decides the output format and whether to square-crop:
//!
//! | Kind | Default class | Crop | Format |
//! |---|---|---|---|
//! | Image | `l` (original) | square, centered | JPEG |
//! | Icon | `s` | none (cropped at upload) | PNG |
//!
//! Unknown or absent class names fall back to the kind's default rather than
//! failing, matching what clients have always been able to send.

use crate::config::SizeTable;
use crate::imaging::{DerivativePlan, OutputFormat, Quality, TargetSize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    /// Parse a query value. Returns `None` for anything but `s`, `m`, `l`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "s" => Some(SizeClass::Small),
            "m" => Some(SizeClass::Medium),
            "l" => Some(SizeClass::Large),
            _ => None,
        }
    }

    /// Directory name under the cache root.
    pub fn as_str(self) -> &'static str {
        match self {
            SizeClass::Small => "s",
            SizeClass::Medium => "m",
            SizeClass::Large => "l",
        }
    }

    fn width_in(self, table: &SizeTable) -> i32 {
        match self {
            SizeClass::Small => table.small,
            SizeClass::Medium => table.medium,
            SizeClass::Large => table.large,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a derivative is cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivativeKind {
    /// Feed item photo.
    Image,
    /// User avatar.
    Icon,
}

impl DerivativeKind {
    /// Directory name for both originals and derivatives of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DerivativeKind::Image => "image",
            DerivativeKind::Icon => "icon",
        }
    }

    pub fn format(self) -> OutputFormat {
        match self {
            DerivativeKind::Image => OutputFormat::Jpeg,
            DerivativeKind::Icon => OutputFormat::Png,
        }
    }

    pub fn default_class(self) -> SizeClass {
        match self {
            DerivativeKind::Image => SizeClass::Large,
            DerivativeKind::Icon => SizeClass::Small,
        }
    }

    /// Resolve an optional query value, falling back to the default class.
    pub fn resolve_class(self, value: Option<&str>) -> SizeClass {
        value
            .and_then(SizeClass::parse)
            .unwrap_or_else(|| self.default_class())
    }

    /// Build the transform plan for `class` using `table`.
    pub fn plan(self, class: SizeClass, table: &SizeTable) -> DerivativePlan {
        DerivativePlan {
            target: TargetSize::from_width(class.width_in(table)),
            square_crop: self == DerivativeKind::Image,
            format: self.format(),
            quality: Quality::new(table.quality),
        }
    }
}

impl fmt::Display for DerivativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
