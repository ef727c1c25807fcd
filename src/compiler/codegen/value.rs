//! Typed values threaded through IR lowering.

use std::fmt;

/// Runtime type tags of the Box language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    Number,
    Str,
    Bool,
    Nil,
    Array,
    Dict,
    Function,
    Pointer,
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoxType::Number => "number",
            BoxType::Str => "string",
            BoxType::Bool => "bool",
            BoxType::Nil => "nil",
            BoxType::Array => "array",
            BoxType::Dict => "dict",
            BoxType::Function => "function",
            BoxType::Pointer => "pointer",
        };
        write!(f, "{}", name)
    }
}

/// An IR value paired with its Box type tag, mutability, and the optional
/// container element/value tags.
#[derive(Debug, Clone)]
pub struct BoxValue {
    /// IR operand text: a register (`%t3`), a constant, or a global.
    pub ir: String,
    pub ty: BoxType,
    pub is_mutable: bool,
    pub element_type: Option<BoxType>,
    pub value_type: Option<BoxType>,
}

impl BoxValue {
    pub fn new(ir: impl Into<String>, ty: BoxType) -> Self {
        Self {
            ir: ir.into(),
            ty,
            is_mutable: true,
            element_type: None,
            value_type: None,
        }
    }

    pub fn immutable(ir: impl Into<String>, ty: BoxType) -> Self {
        Self {
            ir: ir.into(),
            ty,
            is_mutable: false,
            element_type: None,
            value_type: None,
        }
    }

    pub fn with_element_type(mut self, element_type: BoxType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn with_value_type(mut self, value_type: BoxType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

/// A named variable slot: the alloca holding the value plus its static tags.
#[derive(Debug, Clone)]
pub struct VarSlot {
    /// The alloca pointer register (e.g. `%x.addr`).
    pub ptr: String,
    pub ty: BoxType,
    pub is_mutable: bool,
    pub element_type: Option<BoxType>,
    pub value_type: Option<BoxType>,
}
