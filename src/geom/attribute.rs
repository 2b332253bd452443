//! Named attribute columns on a [`Detail`](super::Detail).
//!
//! An attribute holds one value (or tuple) per element of its owner class.
//! Three storage kinds exist:
//! - `Float` - fixed-size tuples of `f64`
//! - `Int` - fixed-size tuples of `i64`
//! - `String` - shared string table plus a per-element table index

use crate::util::{is_valid_attrib_name, Error, Result};
use std::collections::HashMap;

/// Element class an attribute belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttribOwner {
    Point,
    Vertex,
    Primitive,
    Detail,
}

impl AttribOwner {
    pub fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Vertex => "vertex",
            Self::Primitive => "primitive",
            Self::Detail => "detail",
        }
    }
}

/// Semantic type of float tuples; decides how transforms apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    #[default]
    None,
    /// Positions: full affine transform.
    Point,
    /// Directions: linear part only.
    Vector,
    /// Normals: inverse transpose, renormalized.
    Normal,
    Color,
    TexCoord,
    /// 4x4 matrices stored row by row.
    Matrix,
}

/// String-table storage. Index `-1` means "no string".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringColumn {
    table: Vec<String>,
    lookup: HashMap<String, i32>,
    indices: Vec<i32>,
}

/// Index stored for elements without a string.
pub const INVALID_STRING_INDEX: i32 = -1;

impl StringColumn {
    fn with_len(len: usize) -> Self {
        Self { indices: vec![INVALID_STRING_INDEX; len], ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of distinct strings in the table.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Table index of `value`, adding it when missing.
    pub fn add_string(&mut self, value: &str) -> i32 {
        if let Some(&idx) = self.lookup.get(value) {
            return idx;
        }
        let idx = self.table.len() as i32;
        self.table.push(value.to_string());
        self.lookup.insert(value.to_string(), idx);
        idx
    }

    pub fn set_string(&mut self, elem: usize, value: &str) {
        let idx = self.add_string(value);
        self.indices[elem] = idx;
    }

    /// Point an element at an existing table entry.
    pub fn set_index(&mut self, elem: usize, idx: i32) {
        debug_assert!(idx == INVALID_STRING_INDEX || (idx as usize) < self.table.len());
        self.indices[elem] = idx;
    }

    pub fn string_index(&self, elem: usize) -> i32 {
        self.indices.get(elem).copied().unwrap_or(INVALID_STRING_INDEX)
    }

    pub fn get(&self, elem: usize) -> Option<&str> {
        self.lookup_string(self.string_index(elem))
    }

    pub fn lookup_string(&self, idx: i32) -> Option<&str> {
        usize::try_from(idx).ok().and_then(|i| self.table.get(i)).map(String::as_str)
    }

    fn resize(&mut self, len: usize) {
        self.indices.resize(len, INVALID_STRING_INDEX);
    }
}

/// Attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum AttribData {
    Float { tuple_size: usize, values: Vec<f64> },
    Int { tuple_size: usize, values: Vec<i64> },
    String(StringColumn),
}

impl AttribData {
    pub fn tuple_size(&self) -> usize {
        match self {
            Self::Float { tuple_size, .. } | Self::Int { tuple_size, .. } => *tuple_size,
            Self::String(_) => 1,
        }
    }

    /// Same storage kind and tuple size.
    pub fn is_compatible(&self, other: &AttribData) -> bool {
        match (self, other) {
            (Self::Float { tuple_size: a, .. }, Self::Float { tuple_size: b, .. })
            | (Self::Int { tuple_size: a, .. }, Self::Int { tuple_size: b, .. }) => a == b,
            (Self::String(_), Self::String(_)) => true,
            _ => false,
        }
    }

    fn empty_like(&self, len: usize) -> Self {
        match self {
            Self::Float { tuple_size, .. } => {
                Self::Float { tuple_size: *tuple_size, values: vec![0.0; len * tuple_size] }
            }
            Self::Int { tuple_size, .. } => {
                Self::Int { tuple_size: *tuple_size, values: vec![0; len * tuple_size] }
            }
            Self::String(_) => Self::String(StringColumn::with_len(len)),
        }
    }
}

/// One named attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    name: String,
    owner: AttribOwner,
    data: AttribData,
    type_info: TypeInfo,
    non_transforming: bool,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> AttribOwner {
        self.owner
    }

    pub fn data(&self) -> &AttribData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AttribData {
        &mut self.data
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn set_type_info(&mut self, info: TypeInfo) {
        self.type_info = info;
    }

    /// Excluded from transforms applied to the detail.
    pub fn is_non_transforming(&self) -> bool {
        self.non_transforming
    }

    pub fn set_non_transforming(&mut self, value: bool) {
        self.non_transforming = value;
    }

    pub fn tuple_size(&self) -> usize {
        self.data.tuple_size()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match &self.data {
            AttribData::Float { tuple_size, values } => values.len() / tuple_size.max(&1),
            AttribData::Int { tuple_size, values } => values.len() / tuple_size.max(&1),
            AttribData::String(col) => col.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn floats(&self, elem: usize) -> Option<&[f64]> {
        match &self.data {
            AttribData::Float { tuple_size, values } => {
                values.get(elem * tuple_size..(elem + 1) * tuple_size)
            }
            _ => None,
        }
    }

    pub fn set_floats(&mut self, elem: usize, value: &[f64]) {
        if let AttribData::Float { tuple_size, values } = &mut self.data {
            let n = (*tuple_size).min(value.len());
            let start = elem * *tuple_size;
            values[start..start + n].copy_from_slice(&value[..n]);
        }
    }

    pub fn ints(&self, elem: usize) -> Option<&[i64]> {
        match &self.data {
            AttribData::Int { tuple_size, values } => {
                values.get(elem * tuple_size..(elem + 1) * tuple_size)
            }
            _ => None,
        }
    }

    pub fn set_ints(&mut self, elem: usize, value: &[i64]) {
        if let AttribData::Int { tuple_size, values } = &mut self.data {
            let n = (*tuple_size).min(value.len());
            let start = elem * *tuple_size;
            values[start..start + n].copy_from_slice(&value[..n]);
        }
    }

    pub fn strings(&self) -> Option<&StringColumn> {
        match &self.data {
            AttribData::String(col) => Some(col),
            _ => None,
        }
    }

    pub fn strings_mut(&mut self) -> Option<&mut StringColumn> {
        match &mut self.data {
            AttribData::String(col) => Some(col),
            _ => None,
        }
    }

    pub fn get_string(&self, elem: usize) -> Option<&str> {
        self.strings()?.get(elem)
    }

    pub fn set_string(&mut self, elem: usize, value: &str) {
        if let Some(col) = self.strings_mut() {
            col.set_string(elem, value);
        }
    }

    fn resize(&mut self, len: usize) {
        match &mut self.data {
            AttribData::Float { tuple_size, values } => values.resize(len * *tuple_size, 0.0),
            AttribData::Int { tuple_size, values } => values.resize(len * *tuple_size, 0),
            AttribData::String(col) => col.resize(len),
        }
    }

    /// Copy element `src_elem` of `src` into `elem`. Incompatible data is ignored.
    pub fn copy_element(&mut self, elem: usize, src: &Attribute, src_elem: usize) {
        match &src.data {
            AttribData::String(s) => {
                if let AttribData::String(dst) = &mut self.data {
                    match s.get(src_elem) {
                        Some(value) => dst.set_string(elem, value),
                        None => dst.set_index(elem, INVALID_STRING_INDEX),
                    }
                }
            }
            AttribData::Float { .. } => {
                if let Some(v) = src.floats(src_elem) {
                    self.set_floats(elem, v);
                }
            }
            AttribData::Int { .. } => {
                if let Some(v) = src.ints(src_elem) {
                    self.set_ints(elem, v);
                }
            }
        }
    }

    /// Keep only elements whose `keep` flag is set.
    fn compact(&mut self, keep: &[bool]) {
        fn retain<T: Copy>(values: &mut Vec<T>, tuple: usize, keep: &[bool]) {
            let mut out = Vec::with_capacity(values.len());
            for (i, chunk) in values.chunks(tuple.max(1)).enumerate() {
                if keep.get(i).copied().unwrap_or(true) {
                    out.extend_from_slice(chunk);
                }
            }
            *values = out;
        }
        match &mut self.data {
            AttribData::Float { tuple_size, values } => retain(values, *tuple_size, keep),
            AttribData::Int { tuple_size, values } => retain(values, *tuple_size, keep),
            AttribData::String(col) => retain(&mut col.indices, 1, keep),
        }
    }
}

/// Ordered attributes of one owner class.
#[derive(Clone, Debug)]
pub struct AttributeSet {
    owner: AttribOwner,
    attribs: Vec<Attribute>,
}

impl AttributeSet {
    pub(crate) fn new(owner: AttribOwner) -> Self {
        Self { owner, attribs: Vec::new() }
    }

    pub fn owner(&self) -> AttribOwner {
        self.owner
    }

    pub fn find(&self, name: &str) -> Option<&Attribute> {
        self.attribs.iter().find(|a| a.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attribs.iter_mut().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attribs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.attribs.iter_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.attribs.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.attribs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attribs.is_empty()
    }

    /// Find or create an attribute shaped like `prototype`, sized `len`.
    ///
    /// Fails on an invalid name or when an existing attribute with that name
    /// has a different storage kind.
    pub fn add(&mut self, name: &str, prototype: &AttribData, len: usize) -> Result<&mut Attribute> {
        if !is_valid_attrib_name(name) {
            return Err(Error::attribute(name, "invalid attribute name"));
        }
        match self.attribs.iter().position(|a| a.name == name) {
            Some(i) if self.attribs[i].data.is_compatible(prototype) => Ok(&mut self.attribs[i]),
            Some(_) => Err(Error::attribute(
                name,
                format!("exists on {} with a different type", self.owner.name()),
            )),
            None => {
                self.attribs.push(Attribute {
                    name: name.to_string(),
                    owner: self.owner,
                    data: prototype.empty_like(len),
                    type_info: TypeInfo::None,
                    non_transforming: false,
                });
                let last = self.attribs.len() - 1;
                Ok(&mut self.attribs[last])
            }
        }
    }

    pub fn add_float(&mut self, name: &str, tuple_size: usize, len: usize) -> Result<&mut Attribute> {
        self.add(name, &AttribData::Float { tuple_size, values: Vec::new() }, len)
    }

    pub fn add_int(&mut self, name: &str, tuple_size: usize, len: usize) -> Result<&mut Attribute> {
        self.add(name, &AttribData::Int { tuple_size, values: Vec::new() }, len)
    }

    pub fn add_string(&mut self, name: &str, len: usize) -> Result<&mut Attribute> {
        self.add(name, &AttribData::String(StringColumn::default()), len)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let pos = self.attribs.iter().position(|a| a.name == name)?;
        Some(self.attribs.remove(pos))
    }

    pub(crate) fn resize(&mut self, len: usize) {
        for a in &mut self.attribs {
            a.resize(len);
        }
    }

    pub(crate) fn compact(&mut self, keep: &[bool]) {
        for a in &mut self.attribs {
            a.compact(keep);
        }
    }
}
