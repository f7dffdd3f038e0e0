//! Field layout reporting for in-memory values.
//!
//! Rust values carry no object header, so `header_size_bytes` is always 0;
//! offsets come straight from the compiler through [`core::mem::offset_of!`].
//! Implement [`DescribeLayout`] for a struct with [`describe_layout!`].
//!
//! ```
//! use foundation_layout::{describe_layout, DescribeLayout};
//!
//! #[allow(dead_code)]
//! struct Sample {
//!     flag: bool,
//!     count: u64,
//! }
//!
//! describe_layout!(Sample { flag, count });
//!
//! let layout = Sample { flag: true, count: 7 }.describe_layout();
//! assert_eq!(layout.header_size_bytes, 0);
//! assert_eq!(layout.field("count").unwrap().size_bytes, 8);
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset_bytes: usize,
    pub size_bytes: usize,
}

impl FieldLayout {
    #[must_use]
    pub const fn new(name: &'static str, offset_bytes: usize, size_bytes: usize) -> Self {
        Self {
            name,
            offset_bytes,
            size_bytes,
        }
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset_bytes + self.size_bytes
    }
}

/// Header size, total size, alignment and per-field placement of a value.
/// Fields are ordered by offset, which may differ from declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLayout {
    pub type_name: &'static str,
    pub header_size_bytes: usize,
    pub size_bytes: usize,
    pub align_bytes: usize,
    pub fields: Vec<FieldLayout>,
}

impl ObjectLayout {
    #[must_use]
    pub fn of<T>(mut fields: Vec<FieldLayout>) -> Self {
        fields.sort_by_key(|field| field.offset_bytes);
        Self {
            type_name: std::any::type_name::<T>(),
            header_size_bytes: 0,
            size_bytes: std::mem::size_of::<T>(),
            align_bytes: std::mem::align_of::<T>(),
            fields,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Bytes not covered by any field: gaps between fields plus tail padding.
    #[must_use]
    pub fn padding_bytes(&self) -> usize {
        let used: usize = self.fields.iter().map(|field| field.size_bytes).sum();
        self.size_bytes
            .saturating_sub(self.header_size_bytes)
            .saturating_sub(used)
    }
}

impl fmt::Display for ObjectLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} object internals:", self.type_name)?;
        writeln!(f, "{:>6} {:>6} DESCRIPTION", "OFFSET", "SIZE")?;

        let mut cursor = self.header_size_bytes;
        if self.header_size_bytes > 0 {
            writeln!(f, "{:>6} {:>6} (object header)", 0, self.header_size_bytes)?;
        }
        for field in &self.fields {
            if field.offset_bytes > cursor {
                writeln!(
                    f,
                    "{:>6} {:>6} (alignment gap)",
                    cursor,
                    field.offset_bytes - cursor
                )?;
            }
            writeln!(
                f,
                "{:>6} {:>6} {}",
                field.offset_bytes, field.size_bytes, field.name
            )?;
            cursor = cursor.max(field.end());
        }
        if self.size_bytes > cursor {
            writeln!(
                f,
                "{:>6} {:>6} (loss due to the next object alignment)",
                cursor,
                self.size_bytes - cursor
            )?;
        }

        write!(
            f,
            "Instance size: {} bytes, alignment: {} bytes, padding: {} bytes",
            self.size_bytes,
            self.align_bytes,
            self.padding_bytes()
        )
    }
}

/// The single query the inspector answers.
pub trait DescribeLayout {
    fn describe_layout(&self) -> ObjectLayout;
}

/// Implements [`DescribeLayout`] for a struct from its field names.
///
/// Every listed field must be visible at the call site.
#[macro_export]
macro_rules! describe_layout {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::DescribeLayout for $ty {
            fn describe_layout(&self) -> $crate::ObjectLayout {
                $crate::ObjectLayout::of::<$ty>(vec![
                    $(
                        $crate::FieldLayout::new(
                            stringify!($field),
                            ::core::mem::offset_of!($ty, $field),
                            ::core::mem::size_of_val(&self.$field),
                        ),
                    )*
                ])
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Empty;

    describe_layout!(Empty {});

    #[allow(dead_code)]
    #[repr(C)]
    struct Padded {
        flag: bool,
        wide: u64,
        small: u16,
    }

    describe_layout!(Padded { flag, wide, small });

    #[test]
    fn empty_struct_has_no_fields() {
        let layout = Empty.describe_layout();
        assert_eq!(layout.size_bytes, 0);
        assert!(layout.fields.is_empty());
        assert_eq!(layout.padding_bytes(), 0);
    }

    #[test]
    fn repr_c_offsets_follow_declaration() {
        let layout = Padded {
            flag: false,
            wide: 1,
            small: 2,
        }
        .describe_layout();

        assert_eq!(layout.field("flag").unwrap().offset_bytes, 0);
        assert_eq!(layout.field("wide").unwrap().offset_bytes, 8);
        assert_eq!(layout.field("small").unwrap().offset_bytes, 16);
        assert_eq!(layout.size_bytes, 24);
        assert_eq!(layout.padding_bytes(), 24 - 11);
    }

    #[test]
    fn display_marks_gaps() {
        let layout = Padded {
            flag: true,
            wide: 0,
            small: 0,
        }
        .describe_layout();
        let rendered = layout.to_string();

        assert!(rendered.contains("(alignment gap)"));
        assert!(rendered.contains("(loss due to the next object alignment)"));
        assert!(rendered.contains("Instance size: 24 bytes"));
    }

    #[test]
    fn serializes_to_json() {
        let layout = Empty.describe_layout();
        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["header_size_bytes"], 0);
        assert!(json["type_name"].as_str().unwrap().ends_with("Empty"));
    }
}
