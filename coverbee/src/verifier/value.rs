//! Register-value tokens of a verifier state snapshot.
//!
//! A token is a series of type modifiers, an optional precision marker, a
//! base type matched longest-prefix against a fixed lexicon, an optional
//! nullability suffix, and either a bare integer constant or a parenthesized
//! attribute list. The numeric ranges carried by the attributes are
//! preserved for rendering but not consumed by the instrumentation engine.

use core::fmt;
use strum::{EnumIter, IntoEnumIterator};

/// Base type of a register value.
///
/// The legacy `inv` spelling of `scalar` is kept as its own variant so that
/// rendering reproduces the diagnostic byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum BaseType {
    /// A scalar value.
    Scalar,
    /// A scalar value, pre-5.9 spelling.
    Inv,
    /// Pointer to the program context.
    Ctx,
    /// Pointer to a map object.
    MapPtr,
    /// Pointer to a map key.
    MapKey,
    /// Pointer to a map value.
    MapValue,
    /// The frame pointer.
    Fp,
    /// Pointer into packet data.
    Pkt,
    /// Pointer into packet metadata.
    PktMeta,
    /// Pointer to the end of packet data.
    PktEnd,
    /// Pointer to flow-dissector keys.
    FlowKeys,
    /// Pointer to a socket.
    Sock,
    /// Pointer to the common part of a socket.
    SockCommon,
    /// Pointer to a TCP socket.
    TcpSock,
    /// Pointer to a tracepoint buffer.
    TpBuffer,
    /// Pointer to an AF_XDP socket.
    XdpSock,
    /// Generic pointer.
    Ptr,
    /// Pointer to verified memory.
    Mem,
    /// Pointer to a verifier-tracked buffer.
    Buf,
    /// Pointer to a byte-code function.
    Func,
}

impl BaseType {
    /// The spelling used in the diagnostic.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Inv => "inv",
            Self::Ctx => "ctx",
            Self::MapPtr => "map_ptr",
            Self::MapKey => "map_key",
            Self::MapValue => "map_value",
            Self::Fp => "fp",
            Self::Pkt => "pkt",
            Self::PktMeta => "pkt_meta",
            Self::PktEnd => "pkt_end",
            Self::FlowKeys => "flow_keys",
            Self::Sock => "sock",
            Self::SockCommon => "sock_common",
            Self::TcpSock => "tcp_sock",
            Self::TpBuffer => "tp_buffer",
            Self::XdpSock => "xdp_sock",
            Self::Ptr => "ptr_",
            Self::Mem => "mem",
            Self::Buf => "buf",
            Self::Func => "func",
        }
    }

    /// `true` for either spelling of a scalar.
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Scalar | Self::Inv)
    }

    /// Longest-prefix match against the lexicon.
    fn match_prefix(input: &str) -> Option<Self> {
        Self::iter()
            .filter(|base| input.starts_with(base.token()))
            .max_by_key(|base| base.token().len())
    }
}

/// Pointer-type modifier prefixes, drained in order from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum TypeModifier {
    /// Read-only memory.
    Rdonly,
    /// Allocated object.
    Alloc,
    /// User-space memory.
    User,
    /// Per-CPU memory.
    PerCpu,
}

impl TypeModifier {
    /// The spelling used in the diagnostic.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Rdonly => "rdonly_",
            Self::Alloc => "alloc_",
            Self::User => "user_",
            Self::PerCpu => "per_cpu_",
        }
    }
}

/// A tristate number: `mask` bits are unknown, `value` bits are known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tnum {
    /// Known bits.
    pub value: u64,
    /// Unknown bits.
    pub mask: u64,
}

impl Tnum {
    /// `true` when every bit is known.
    pub const fn is_const(self) -> bool {
        self.mask == 0
    }

    /// `true` when no bit is known.
    pub const fn is_unknown(self) -> bool {
        self.mask == u64::MAX
    }
}

impl fmt::Display for Tnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}; {:#x})", self.value, self.mask)
    }
}

/// Value of one `key=value` attribute inside a parenthesized list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// A signed integer.
    Signed(i64),
    /// An unsigned integer too large for `i64`.
    Unsigned(u64),
    /// A tristate number, `var_off=(value; mask)`.
    Tnum(Tnum),
    /// Anything else, preserved verbatim.
    Raw(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Tnum(t) => t.fmt(f),
            Self::Raw(raw) => f.write_str(raw),
        }
    }
}

/// One attribute of a register value; `value` is absent for bare flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Attribute key, e.g. `umax_value`.
    pub key: String,
    /// Attribute value, if any.
    pub value: Option<AttrValue>,
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => f.write_str(&self.key),
        }
    }
}

/// Payload following the base type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// No payload at all, e.g. `R1=ctx`.
    Bare,
    /// A constant, e.g. `fp0` or `inv-1`.
    Const(i64),
    /// A parenthesized attribute list.
    Attrs(Vec<Attr>),
}

/// A fully parsed register value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValue {
    /// Ordered modifier prefixes.
    pub modifiers: Vec<TypeModifier>,
    /// Precision marker before the base type.
    pub precise_before: bool,
    /// Base type; `None` for the bare-constant scalar form, e.g. `R2_w=4`.
    pub base: Option<BaseType>,
    /// Nullability suffix present.
    pub or_null: bool,
    /// Precision marker after the base type.
    pub precise_after: bool,
    /// Constant or attribute payload.
    pub contents: Contents,
}

impl RegisterValue {
    /// `true` when either precision marker was present.
    pub fn precise(&self) -> bool {
        self.precise_before || self.precise_after
    }

    /// `true` for scalar values, spelled or bare.
    pub fn is_scalar(&self) -> bool {
        self.base.map_or(true, BaseType::is_scalar)
    }

    /// Look up an attribute by key.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        match &self.contents {
            Contents::Attrs(attrs) => attrs
                .iter()
                .find(|attr| attr.key == key)
                .and_then(|attr| attr.value.as_ref()),
            _ => None,
        }
    }

    /// Integer attribute by key, widened to `i128` so both signed and
    /// unsigned encodings fit.
    pub fn int_attr(&self, key: &str) -> Option<i128> {
        match self.attr(key)? {
            AttrValue::Signed(v) => Some(i128::from(*v)),
            AttrValue::Unsigned(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// The tristate number, when present.
    pub fn var_off(&self) -> Option<Tnum> {
        match self.attr("var_off")? {
            AttrValue::Tnum(t) => Some(*t),
            _ => None,
        }
    }

    /// Parse a register-value token. `None` means the token does not fit
    /// the value grammar at all; the caller keeps it opaque.
    pub(crate) fn parse(token: &str) -> Option<Self> {
        let mut rest = token;

        let mut modifiers = Vec::new();
        'drain: loop {
            for modifier in TypeModifier::iter() {
                if let Some(stripped) = rest.strip_prefix(modifier.token()) {
                    modifiers.push(modifier);
                    rest = stripped;
                    continue 'drain;
                }
            }
            break;
        }

        let mut precise_before = false;
        if let Some(stripped) = rest.strip_prefix('P') {
            precise_before = true;
            rest = stripped;
        }

        let base = BaseType::match_prefix(rest);
        if let Some(base) = base {
            rest = &rest[base.token().len()..];
        }

        let mut or_null = false;
        for suffix in ["_or_null_", "_or_null", "or_null_"] {
            if let Some(stripped) = rest.strip_prefix(suffix) {
                or_null = true;
                rest = stripped;
                break;
            }
        }

        let mut precise_after = false;
        if let Some(stripped) = rest.strip_prefix('P') {
            precise_after = true;
            rest = stripped;
        }

        let contents = if rest.is_empty() {
            // A lone `P` or an empty token is not a value.
            base?;
            Contents::Bare
        } else if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            Contents::Attrs(parse_attrs(inner)?)
        } else {
            Contents::Const(rest.parse().ok()?)
        };

        Some(Self {
            modifiers,
            precise_before,
            base,
            or_null,
            precise_after,
            contents,
        })
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            f.write_str(modifier.token())?;
        }
        if self.precise_before {
            f.write_str("P")?;
        }
        if let Some(base) = self.base {
            f.write_str(base.token())?;
        }
        if self.or_null {
            f.write_str("_or_null")?;
        }
        if self.precise_after {
            f.write_str("P")?;
        }
        match &self.contents {
            Contents::Bare => Ok(()),
            Contents::Const(v) => write!(f, "{}", v),
            Contents::Attrs(attrs) => {
                f.write_str("(")?;
                let mut first = true;
                for attr in attrs {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    attr.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn parse_attrs(inner: &str) -> Option<Vec<Attr>> {
    let mut attrs = Vec::new();

    for item in split_attrs(inner) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let attr = match item.split_once('=') {
            Some((key, value)) => Attr {
                key: key.to_string(),
                value: Some(parse_attr_value(value)),
            },
            None => Attr {
                key: item.to_string(),
                value: None,
            },
        };
        attrs.push(attr);
    }

    Some(attrs)
}

fn parse_attr_value(value: &str) -> AttrValue {
    if let Some(tnum) = parse_tnum(value) {
        return AttrValue::Tnum(tnum);
    }
    if let Ok(v) = value.parse::<i64>() {
        return AttrValue::Signed(v);
    }
    if let Ok(v) = value.parse::<u64>() {
        return AttrValue::Unsigned(v);
    }
    AttrValue::Raw(value.to_string())
}

fn parse_tnum(value: &str) -> Option<Tnum> {
    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    let (known, mask) = inner.split_once(';')?;

    let parse_hex = |s: &str| {
        let s = s.trim();
        u64::from_str_radix(s.strip_prefix("0x")?, 16).ok()
    };

    Some(Tnum {
        value: parse_hex(known)?,
        mask: parse_hex(mask)?,
    })
}

/// Split a comma-separated attribute list, honoring nested parentheses.
fn split_attrs(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_with_ranges() {
        let value = RegisterValue::parse("inv(id=0,umax_value=65535,var_off=(0x0; 0xffff))")
            .expect("value");

        assert_eq!(value.base, Some(BaseType::Inv));
        assert!(value.is_scalar());
        assert_eq!(value.int_attr("id"), Some(0));
        assert_eq!(value.int_attr("umax_value"), Some(65535));
        assert_eq!(
            value.var_off(),
            Some(Tnum {
                value: 0,
                mask: 0xffff
            })
        );
        assert_eq!(
            value.to_string(),
            "inv(id=0,umax_value=65535,var_off=(0x0; 0xffff))"
        );
    }

    #[test]
    fn precise_scalar() {
        let value = RegisterValue::parse("invP(id=0)").expect("value");
        assert!(value.precise());
        assert_eq!(value.to_string(), "invP(id=0)");
    }

    #[test]
    fn frame_pointer_constant() {
        let value = RegisterValue::parse("fp0").expect("value");
        assert_eq!(value.base, Some(BaseType::Fp));
        assert_eq!(value.contents, Contents::Const(0));
        assert_eq!(value.to_string(), "fp0");
    }

    #[test]
    fn bare_constant_scalar() {
        let value = RegisterValue::parse("4").expect("value");
        assert_eq!(value.base, None);
        assert!(value.is_scalar());
        assert_eq!(value.contents, Contents::Const(4));
        assert_eq!(value.to_string(), "4");

        let precise = RegisterValue::parse("P-1").expect("value");
        assert!(precise.precise());
        assert_eq!(precise.to_string(), "P-1");
    }

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(
            RegisterValue::parse("map_value(id=0,off=0,ks=4,vs=100,imm=0)")
                .expect("value")
                .base,
            Some(BaseType::MapValue)
        );
        assert_eq!(
            RegisterValue::parse("pkt_end(id=0,off=0,imm=0)")
                .expect("value")
                .base,
            Some(BaseType::PktEnd)
        );
    }

    #[test]
    fn modifiers_and_nullability() {
        let value = RegisterValue::parse("rdonly_mem_or_null(id=3,ref_obj_id=2,sz=16)")
            .expect("value");
        assert_eq!(value.modifiers, vec![TypeModifier::Rdonly]);
        assert_eq!(value.base, Some(BaseType::Mem));
        assert!(value.or_null);
        assert_eq!(value.to_string(), "rdonly_mem_or_null(id=3,ref_obj_id=2,sz=16)");

        let legacy = RegisterValue::parse("map_value_or_null(id=1,off=0,ks=4,vs=8,imm=0)")
            .expect("value");
        assert!(legacy.or_null);
    }

    #[test]
    fn unsigned_attribute_survives() {
        let value =
            RegisterValue::parse("inv(umax_value=18446744073709551615)").expect("value");
        assert_eq!(
            value.attr("umax_value"),
            Some(&AttrValue::Unsigned(u64::MAX))
        );
        assert_eq!(value.to_string(), "inv(umax_value=18446744073709551615)");
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(RegisterValue::parse(""), None);
        assert_eq!(RegisterValue::parse("P"), None);
        assert_eq!(RegisterValue::parse("!!"), None);
    }
}
