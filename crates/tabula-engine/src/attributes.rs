//! Cell formatting attributes.
//!
//! The attribute set is closed: [`AttributeName`] enumerates every name,
//! [`CellAttributes`] holds a concrete value for each one and
//! [`AttributeDiff`] holds an optional override for each one. Attributes
//! whose value may be null (colors, fonts, merge areas, button labels) are
//! `Option<T>` in [`CellAttributes`] and `Option<Option<T>>` in
//! [`AttributeDiff`], so an explicit null differs from "not set".

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AttributeTypeError;
use crate::key::CellKey;

/// RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => None,
        }
    }
}

/// Rectangle of cells rendered as one, anchored at its top-left cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeArea {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl MergeArea {
    pub const fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.top <= self.bottom && self.left <= self.right
    }

    pub fn contains(&self, row: usize, column: usize) -> bool {
        self.top <= row && row <= self.bottom && self.left <= column && column <= self.right
    }

    pub fn anchor(&self, table: usize) -> CellKey {
        CellKey::new(self.top, self.left, table)
    }
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl AttrType for $name {
            const EXPECTED: &'static str = "text";

            fn from_value(value: AttrValue) -> Option<Self> {
                match value {
                    AttrValue::Text(s) => s.parse().ok(),
                    _ => None,
                }
            }

            fn to_value(&self) -> AttrValue {
                AttrValue::Text(self.as_str().to_string())
            }
        }
    };
}

text_enum!(FontWeight { Normal => "normal", Bold => "bold" });
text_enum!(FontStyle { Normal => "normal", Italic => "italic" });
text_enum!(Justification {
    Left => "left",
    Center => "center",
    Right => "right",
    Fill => "fill",
});
text_enum!(VerticalAlign {
    Top => "top",
    Middle => "middle",
    Bottom => "bottom",
});
text_enum!(
    /// How a cell's result is presented. Rendering itself happens elsewhere.
    Renderer {
        Text => "text",
        Markup => "markup",
        Image => "image",
        Chart => "chart",
    }
);

/// Dynamically typed attribute value, used when attributes are set by name.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Color(Color),
    Rect(MergeArea),
}

impl AttrValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Text(_) => "text",
            AttrValue::Color(_) => "color",
            AttrValue::Rect(_) => "rect",
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<Color> for AttrValue {
    fn from(value: Color) -> Self {
        AttrValue::Color(value)
    }
}

impl From<MergeArea> for AttrValue {
    fn from(value: MergeArea) -> Self {
        AttrValue::Rect(value)
    }
}

/// Conversion between a typed attribute field and [`AttrValue`].
pub trait AttrType: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: AttrValue) -> Option<Self>;
    fn to_value(&self) -> AttrValue;
}

impl AttrType for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Bool(*self)
    }
}

impl AttrType for u32 {
    const EXPECTED: &'static str = "non-negative int";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Int(n) => u32::try_from(n).ok(),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Int(i64::from(*self))
    }
}

impl AttrType for f64 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Float(f) => Some(f),
            AttrValue::Int(n) => Some(n as f64),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Float(*self)
    }
}

impl AttrType for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Text(self.clone())
    }
}

impl AttrType for Color {
    const EXPECTED: &'static str = "color";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Color(c) => Some(c),
            AttrValue::Text(s) => Color::from_hex(&s),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Color(*self)
    }
}

impl AttrType for MergeArea {
    const EXPECTED: &'static str = "rect";

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Rect(area) => Some(area),
            _ => None,
        }
    }

    fn to_value(&self) -> AttrValue {
        AttrValue::Rect(*self)
    }
}

impl<T: AttrType> AttrType for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: AttrValue) -> Option<Self> {
        match value {
            AttrValue::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_value(&self) -> AttrValue {
        match self {
            Some(inner) => inner.to_value(),
            None => AttrValue::Null,
        }
    }
}

/// Deserialize a present field as `Some`, so `null` becomes `Some(None)`
/// for nullable attributes instead of collapsing to "absent".
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn check_merge_area(area: &MergeArea) -> Result<(), AttributeTypeError> {
    if area.is_valid() {
        Ok(())
    } else {
        Err(AttributeTypeError::InvertedMergeArea {
            top: area.top,
            left: area.left,
            bottom: area.bottom,
            right: area.right,
        })
    }
}

macro_rules! attributes {
    ($($variant:ident => $field:ident : $ty:ty = $default:expr),+ $(,)?) => {
        /// Name of a cell attribute.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum AttributeName {
            $($variant),+
        }

        impl AttributeName {
            pub const ALL: &'static [AttributeName] = &[$(AttributeName::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(AttributeName::$variant => stringify!($field)),+
                }
            }
        }

        impl FromStr for AttributeName {
            type Err = AttributeTypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($field) => Ok(AttributeName::$variant),)+
                    _ => Err(AttributeTypeError::UnknownName(s.to_string())),
                }
            }
        }

        /// Fully resolved attributes of one cell.
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        pub struct CellAttributes {
            $(pub $field: $ty),+
        }

        impl Default for CellAttributes {
            fn default() -> Self {
                CellAttributes {
                    $($field: $default),+
                }
            }
        }

        impl CellAttributes {
            /// Overwrite every attribute present in `diff`.
            pub fn apply(&mut self, diff: &AttributeDiff) {
                $(
                    if let Some(value) = &diff.$field {
                        self.$field = value.clone();
                    }
                )+
            }

            pub fn get(&self, name: AttributeName) -> AttrValue {
                match name {
                    $(AttributeName::$variant => self.$field.to_value()),+
                }
            }
        }

        /// Partial attribute override; `None` fields leave the attribute alone.
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct AttributeDiff {
            $(
                #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )+
        }

        impl AttributeDiff {
            /// Set `name` from a dynamically typed value.
            pub fn set(&mut self, name: AttributeName, value: AttrValue) -> Result<(), AttributeTypeError> {
                if let AttrValue::Rect(area) = &value {
                    check_merge_area(area)?;
                }
                let found = value.kind();
                match name {
                    $(
                        AttributeName::$variant => {
                            let typed = <$ty as AttrType>::from_value(value).ok_or(
                                AttributeTypeError::WrongType {
                                    name,
                                    expected: <$ty as AttrType>::EXPECTED,
                                    found,
                                },
                            )?;
                            self.$field = Some(typed);
                        }
                    )+
                }
                Ok(())
            }

            pub fn get(&self, name: AttributeName) -> Option<AttrValue> {
                match name {
                    $(AttributeName::$variant => self.$field.as_ref().map(AttrType::to_value)),+
                }
            }

            pub fn contains(&self, name: AttributeName) -> bool {
                match name {
                    $(AttributeName::$variant => self.$field.is_some()),+
                }
            }

            pub fn clear(&mut self, name: AttributeName) {
                match name {
                    $(AttributeName::$variant => self.$field = None),+
                }
            }
        }
    };
}

attributes! {
    BorderwidthBottom => borderwidth_bottom: u32 = 1,
    BorderwidthRight => borderwidth_right: u32 = 1,
    BordercolorBottom => bordercolor_bottom: Option<Color> = None,
    BordercolorRight => bordercolor_right: Option<Color> = None,
    Bgcolor => bgcolor: Option<Color> = None,
    Textcolor => textcolor: Option<Color> = None,
    Textfont => textfont: Option<String> = None,
    Pointsize => pointsize: f64 = 10.0,
    Fontweight => fontweight: FontWeight = FontWeight::Normal,
    Fontstyle => fontstyle: FontStyle = FontStyle::Normal,
    Underline => underline: bool = false,
    Strikethrough => strikethrough: bool = false,
    Angle => angle: f64 = 0.0,
    Justification => justification: Justification = Justification::Left,
    VerticalAlign => vertical_align: VerticalAlign = VerticalAlign::Top,
    Renderer => renderer: Renderer = Renderer::Text,
    Locked => locked: bool = false,
    Frozen => frozen: bool = false,
    MergeArea => merge_area: Option<MergeArea> = None,
    ButtonCell => button_cell: Option<String> = None,
    PanelCell => panel_cell: bool = false,
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AttributeDiff {
    /// Build a diff from `(name, value)` pairs, failing on the first bad one.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, AttributeTypeError>
    where
        I: IntoIterator<Item = (&'a str, AttrValue)>,
    {
        let mut diff = AttributeDiff::default();
        for (name, value) in pairs {
            diff.set(name.parse()?, value)?;
        }
        Ok(diff)
    }

    /// Builder form of [`AttributeDiff::set`].
    pub fn with(mut self, name: AttributeName, value: impl Into<AttrValue>) -> Result<Self, AttributeTypeError> {
        self.set(name, value.into())?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<AttributeName> {
        AttributeName::ALL
            .iter()
            .copied()
            .filter(|name| self.contains(*name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    /// Reject values no typed setter can catch, such as inverted merge areas.
    pub fn validate(&self) -> Result<(), AttributeTypeError> {
        match &self.merge_area {
            Some(Some(area)) => check_merge_area(area),
            _ => Ok(()),
        }
    }

    /// Diff marking a cell as frozen or thawed.
    pub fn frozen(frozen: bool) -> Self {
        AttributeDiff {
            frozen: Some(frozen),
            ..AttributeDiff::default()
        }
    }

    /// Diff setting (or clearing, with `None`) a merge area.
    pub fn merge_area(area: Option<MergeArea>) -> Self {
        AttributeDiff {
            merge_area: Some(area),
            ..AttributeDiff::default()
        }
    }

    /// Diff setting (or clearing, with `None`) a button label.
    pub fn button_cell(label: Option<String>) -> Self {
        AttributeDiff {
            button_cell: Some(label),
            ..AttributeDiff::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let attrs = CellAttributes::default();
        assert_eq!(attrs.borderwidth_bottom, 1);
        assert_eq!(attrs.borderwidth_right, 1);
        assert_eq!(attrs.pointsize, 10.0);
        assert_eq!(attrs.angle, 0.0);
        assert_eq!(attrs.vertical_align, VerticalAlign::Top);
        assert_eq!(attrs.justification, Justification::Left);
        assert_eq!(attrs.renderer, Renderer::Text);
        assert_eq!(attrs.button_cell, None);
        assert!(!attrs.panel_cell);
        assert!(!attrs.frozen);
        assert_eq!(attrs.merge_area, None);
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(AttributeName::ALL.len(), 21);
        for name in AttributeName::ALL {
            assert_eq!(name.as_str().parse::<AttributeName>(), Ok(*name));
        }
        assert!(matches!(
            "sparkle".parse::<AttributeName>(),
            Err(AttributeTypeError::UnknownName(_))
        ));
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut diff = AttributeDiff::default();
        let err = diff
            .set(AttributeName::Underline, AttrValue::Text("yes".into()))
            .unwrap_err();
        assert_eq!(
            err,
            AttributeTypeError::WrongType {
                name: AttributeName::Underline,
                expected: "bool",
                found: "text",
            }
        );
        assert!(diff.is_empty());

        assert!(diff.set(AttributeName::BorderwidthBottom, AttrValue::Int(-1)).is_err());
        assert!(diff.set(AttributeName::Renderer, AttrValue::Text("svg".into())).is_err());
    }

    #[test]
    fn test_explicit_null_differs_from_absent() {
        let mut diff = AttributeDiff::default();
        assert!(!diff.contains(AttributeName::Bgcolor));
        diff.set(AttributeName::Bgcolor, AttrValue::Null).unwrap();
        assert!(diff.contains(AttributeName::Bgcolor));
        assert_eq!(diff.bgcolor, Some(None));

        let mut attrs = CellAttributes {
            bgcolor: Some(Color::rgb(1, 2, 3)),
            ..CellAttributes::default()
        };
        attrs.apply(&diff);
        assert_eq!(attrs.bgcolor, None);
    }

    #[test]
    fn test_inverted_merge_area_rejected() {
        let err = AttributeDiff::default()
            .with(AttributeName::MergeArea, MergeArea::new(3, 0, 1, 0))
            .unwrap_err();
        assert!(matches!(err, AttributeTypeError::InvertedMergeArea { .. }));
    }

    #[test]
    fn test_from_pairs_and_apply() {
        let diff = AttributeDiff::from_pairs([
            ("fontweight", AttrValue::from("bold")),
            ("pointsize", AttrValue::Int(14)),
            ("textcolor", AttrValue::from("#ff0000")),
        ])
        .unwrap();
        assert_eq!(
            diff.names(),
            vec![
                AttributeName::Textcolor,
                AttributeName::Pointsize,
                AttributeName::Fontweight
            ]
        );

        let mut attrs = CellAttributes::default();
        attrs.apply(&diff);
        assert_eq!(attrs.fontweight, FontWeight::Bold);
        assert_eq!(attrs.pointsize, 14.0);
        assert_eq!(attrs.textcolor, Some(Color::rgb(255, 0, 0)));
        assert_eq!(attrs.get(AttributeName::Fontweight), AttrValue::Text("bold".into()));
    }

    #[test]
    fn test_diff_serde_keeps_explicit_null() {
        let diff = AttributeDiff::merge_area(None);
        let json = serde_json::to_string(&diff).unwrap();
        assert_eq!(json, r#"{"merge_area":null}"#);
        let back: AttributeDiff = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diff);

        let empty: AttributeDiff = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_color_hex() {
        let color = Color::rgb(0x12, 0xab, 0xff);
        assert_eq!(color.to_hex(), "#12abff");
        assert_eq!(Color::from_hex("#12abff"), Some(color));
        assert_eq!(Color::from_hex("12abff"), None);
        assert_eq!(Color::from_hex("#12ab"), None);
    }
}
