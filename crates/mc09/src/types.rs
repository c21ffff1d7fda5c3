//! Type descriptors and the type manager.
//!
//! Every type of the dialect is interned into one canonical
//! [`TypeDesc`] held by the [`TypeManager`]; comparing [`TypeId`]s
//! compares types. The 32-bit integers and the reals have no basic
//! type of their own: following the target's layout they are modeled
//! as class types with reserved names and a fixed size (4 bytes for
//! longs, 5 bytes for singles; `double` is an alias for `float` on
//! this platform).

use bitflags::bitflags;
use indexmap::IndexMap;
use lang_mc::TypeId;
use smallvec::SmallVec;
use std::collections::HashMap;

pub const LONG_CLASS_NAME: &str = "_Long";
pub const ULONG_CLASS_NAME: &str = "_ULong";
pub const SINGLE_CLASS_NAME: &str = "_Single";
pub const DOUBLE_CLASS_NAME: &str = "_Double";

/// Size in bytes of a real number on the target.
pub const REAL_SIZE: u16 = 5;

/// The fundamental kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Void,
    Byte,
    Word,
    /// Placeholder used only while parsing a declaration.
    Sizeless,
    Pointer,
    Array,
    Function,
    Class,
}

bitflags! {
    /// Type qualifiers, one set per indirection level of a declarator.
    pub struct TypeQuals: u8 {
        const CONST    = 0b01;
        const VOLATILE = 0b10;
    }
}

/// Signature of a function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub return_type: TypeId,
    pub params: Vec<TypeId>,
    pub ends_with_ellipsis: bool,
    pub is_interrupt_service_routine: bool,
    pub first_param_in_reg: bool,
}

/// Canonical, immutable description of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub base: BasicType,
    pub is_signed: bool,
    /// The `const` qualifier at this level only.
    pub is_constant: bool,
    pub is_union: bool,
    /// Class name for `Class`; empty otherwise.
    pub class_name: String,
    /// Pointee for `Pointer`, element type for `Array`.
    pub pointed: Option<TypeId>,
    /// Element count for one `Array` level; `None` while unknown.
    pub num_array_elements: Option<u16>,
    /// Present for `Function`.
    pub signature: Option<FunctionSignature>,
}

impl TypeDesc {
    fn basic(base: BasicType, is_signed: bool) -> TypeDesc {
        TypeDesc {
            base,
            is_signed,
            is_constant: false,
            is_union: false,
            class_name: String::new(),
            pointed: None,
            num_array_elements: None,
            signature: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.base == BasicType::Class
            && (self.class_name == LONG_CLASS_NAME || self.class_name == ULONG_CLASS_NAME)
    }

    pub fn is_single(&self) -> bool {
        self.base == BasicType::Class && self.class_name == SINGLE_CLASS_NAME
    }

    pub fn is_double(&self) -> bool {
        self.base == BasicType::Class && self.class_name == DOUBLE_CLASS_NAME
    }

    pub fn is_real(&self) -> bool {
        self.is_single() || self.is_double()
    }

    pub fn is_real_or_long(&self) -> bool {
        self.is_real() || self.is_long()
    }

    pub fn is_byte_or_word(&self) -> bool {
        matches!(self.base, BasicType::Byte | BasicType::Word)
    }

    pub fn is_integral(&self) -> bool {
        self.is_byte_or_word() || self.is_long()
    }

    pub fn is_numerical(&self) -> bool {
        self.is_integral() || self.is_real()
    }

    pub fn is_ptr_or_array(&self) -> bool {
        matches!(self.base, BasicType::Pointer | BasicType::Array)
    }

    /// A user-defined struct or union, as opposed to the class-shaped
    /// numeric types.
    pub fn is_struct(&self) -> bool {
        self.base == BasicType::Class && !self.is_numerical()
    }
}

/// A member of a struct or union definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub name: String,
    pub member_type: TypeId,
    pub dims: SmallVec<[u16; 2]>,
}

impl ClassMember {
    /// Element count; 1 for a scalar member (empty product).
    pub fn num_elements(&self) -> u16 {
        self.dims.iter().product()
    }
}

/// A struct or union definition: the body behind a class type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDef {
    pub name: String,
    pub is_union: bool,
    pub members: Vec<ClassMember>,
}

impl ClassDef {
    pub fn member(&self, name: &str) -> Option<&ClassMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// An enumerated constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Enumerator {
    pub value: u16,
    /// Name of the enclosing `enum`, when it has one.
    pub enum_name: Option<String>,
    pub enumerator_type: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InternKey(TypeDesc);

/// Interner and oracle for all types of a translation unit.
///
/// The intern tables are mutated while parsing and semantic analysis
/// run and are read-only during code emission.
#[derive(Debug)]
pub struct TypeManager {
    descs: Vec<TypeDesc>,
    intern: HashMap<InternKey, TypeId>,
    /// Struct/union bodies, keyed by class name. A class type may be
    /// interned before its body is seen; size queries fail until the
    /// body is attached.
    classes: IndexMap<String, ClassDef>,
    enumerators: IndexMap<String, Enumerator>,
}

impl Default for TypeManager {
    fn default() -> TypeManager {
        TypeManager::new()
    }
}

impl TypeManager {
    pub fn new() -> TypeManager {
        TypeManager {
            descs: Vec::with_capacity(64),
            intern: HashMap::new(),
            classes: IndexMap::new(),
            enumerators: IndexMap::new(),
        }
    }

    fn intern(&mut self, desc: TypeDesc) -> TypeId {
        if let Some(&id) = self.intern.get(&InternKey(desc.clone())) {
            return id;
        }
        let id = TypeId(self.descs.len() as u32);
        self.descs.push(desc.clone());
        self.intern.insert(InternKey(desc), id);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeDesc {
        &self.descs[id.0 as usize]
    }

    // ----- constructors -----

    pub fn void_type(&mut self) -> TypeId {
        self.intern(TypeDesc::basic(BasicType::Void, false))
    }

    pub fn basic_type(&mut self, base: BasicType, is_signed: bool) -> TypeId {
        debug_assert!(matches!(
            base,
            BasicType::Byte | BasicType::Word | BasicType::Sizeless | BasicType::Void
        ));
        self.intern(TypeDesc::basic(base, is_signed))
    }

    pub fn long_type(&mut self, is_signed: bool) -> TypeId {
        let mut desc = TypeDesc::basic(BasicType::Class, is_signed);
        desc.class_name = if is_signed { LONG_CLASS_NAME } else { ULONG_CLASS_NAME }.to_string();
        self.intern(desc)
    }

    /// `float` and `double` intern to distinct descriptors so that
    /// diagnostics can name the type the program wrote, but both are
    /// 5-byte singles to the code generator.
    pub fn real_type(&mut self, is_double: bool) -> TypeId {
        let mut desc = TypeDesc::basic(BasicType::Class, true);
        desc.class_name =
            if is_double { DOUBLE_CLASS_NAME } else { SINGLE_CLASS_NAME }.to_string();
        self.intern(desc)
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        let mut desc = TypeDesc::basic(BasicType::Pointer, false);
        desc.pointed = Some(pointee);
        self.intern(desc)
    }

    pub fn pointer_to_void(&mut self) -> TypeId {
        let v = self.void_type();
        self.pointer_to(v)
    }

    /// Builds a pointer chain over `pointee` with one indirection per
    /// entry of `quals`, innermost first, the way a declarator
    /// supplies them; each entry qualifies the pointer level it
    /// creates. Volatile bits are accepted and dropped; the caller is
    /// expected to have warned about them.
    pub fn pointer_to_qualified(&mut self, pointee: TypeId, quals: &[TypeQuals]) -> TypeId {
        let mut ty = pointee;
        for q in quals {
            ty = self.pointer_to(ty);
            if q.contains(TypeQuals::CONST) {
                ty = self.with_const(ty);
            }
        }
        ty
    }

    pub fn with_const(&mut self, id: TypeId) -> TypeId {
        let mut desc = self.get(id).clone();
        if desc.is_constant {
            return id;
        }
        desc.is_constant = true;
        self.intern(desc)
    }

    /// One `Array` level per dimension, outermost first, so that
    /// `char a[2][3]` is array-of-2 of array-of-3 of char.
    pub fn array_of(&mut self, element: TypeId, dims: &[Option<u16>]) -> TypeId {
        let mut ty = element;
        for dim in dims.iter().rev() {
            let mut desc = TypeDesc::basic(BasicType::Array, false);
            desc.pointed = Some(ty);
            desc.num_array_elements = *dim;
            ty = self.intern(desc);
        }
        ty
    }

    pub fn array_of_char(&mut self) -> TypeId {
        let ch = self.basic_type(BasicType::Byte, true);
        self.array_of(ch, &[None])
    }

    pub fn class_type(&mut self, name: &str, is_union: bool) -> TypeId {
        let mut desc = TypeDesc::basic(BasicType::Class, false);
        desc.class_name = name.to_string();
        desc.is_union = is_union;
        self.intern(desc)
    }

    pub fn function_type(&mut self, signature: FunctionSignature) -> TypeId {
        let mut desc = TypeDesc::basic(BasicType::Function, false);
        desc.signature = Some(signature);
        self.intern(desc)
    }

    pub fn function_pointer_type(&mut self, signature: FunctionSignature) -> TypeId {
        let f = self.function_type(signature);
        self.pointer_to(f)
    }

    // ----- class bodies -----

    /// Attaches (or replaces, for a forward-declared tag) the body of
    /// a struct or union.
    pub fn declare_class(&mut self, def: ClassDef) {
        self.classes.insert(def.name.clone(), def);
    }

    pub fn class_def(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Byte offset of a member inside its class. Unions put every
    /// member at offset zero.
    pub fn member_offset(&self, class_name: &str, member: &str) -> Option<u16> {
        let def = self.classes.get(class_name)?;
        if def.is_union {
            return def.member(member).map(|_| 0);
        }
        let mut offset = 0u16;
        for m in &def.members {
            if m.name == member {
                return Some(offset);
            }
            offset = offset.wrapping_add(self.member_size(m)?);
        }
        None
    }

    fn member_size(&self, m: &ClassMember) -> Option<u16> {
        let elem = self.size_of(m.member_type)?;
        Some(elem.wrapping_mul(m.num_elements()))
    }

    // ----- enumerators -----

    pub fn declare_enumerator(
        &mut self,
        name: &str,
        value: u16,
        enum_name: Option<&str>,
        enumerator_type: TypeId,
    ) -> bool {
        if self.enumerators.contains_key(name) {
            return false;
        }
        self.enumerators.insert(
            name.to_string(),
            Enumerator {
                value,
                enum_name: enum_name.map(str::to_string),
                enumerator_type,
            },
        );
        true
    }

    pub fn is_enumerator_name(&self, name: &str) -> bool {
        self.enumerators.contains_key(name)
    }

    pub fn enumerator_value(&self, name: &str) -> Option<u16> {
        self.enumerators.get(name).map(|e| e.value)
    }

    pub fn enumerator_type(&self, name: &str) -> Option<TypeId> {
        self.enumerators.get(name).map(|e| e.enumerator_type)
    }

    pub fn enumerator_names(&self) -> Vec<String> {
        self.enumerators.keys().cloned().collect()
    }

    pub fn enum_of(&self, name: &str) -> Option<String> {
        self.enumerators.get(name).and_then(|e| e.enum_name.clone())
    }

    /// Enumerators grouped by enclosing enum, for the duplicate-value
    /// check.
    pub fn enumerators_of(&self, enum_name: &str) -> Vec<(&str, u16)> {
        self.enumerators
            .iter()
            .filter(|(_, e)| e.enum_name.as_deref() == Some(enum_name))
            .map(|(n, e)| (n.as_str(), e.value))
            .collect()
    }

    // ----- queries -----

    /// Size of a type in bytes. `None` for incomplete types: void in
    /// value position, an array with an unknown dimension, a class
    /// whose body has not been seen. The caller reports the
    /// diagnostic.
    pub fn size_of(&self, id: TypeId) -> Option<u16> {
        let desc = self.get(id);
        match desc.base {
            BasicType::Void => Some(0),
            BasicType::Byte => Some(1),
            BasicType::Word | BasicType::Pointer => Some(2),
            BasicType::Sizeless => None,
            BasicType::Function => Some(2), // used as a code address
            BasicType::Array => {
                let n = desc.num_array_elements?;
                let elem = self.size_of(desc.pointed.expect("array without element type"))?;
                Some(n.wrapping_mul(elem))
            }
            BasicType::Class => {
                if desc.is_long() {
                    return Some(4);
                }
                if desc.is_real() {
                    return Some(REAL_SIZE);
                }
                let def = self.classes.get(&desc.class_name)?;
                if def.members.is_empty() {
                    return None; // body not seen yet
                }
                if def.is_union {
                    let mut max = 0u16;
                    for m in &def.members {
                        max = max.max(self.member_size(m)?);
                    }
                    Some(max)
                } else {
                    let mut sum = 0u16;
                    for m in &def.members {
                        sum = sum.wrapping_add(self.member_size(m)?);
                    }
                    Some(sum)
                }
            }
        }
    }

    /// The element type after stripping every array level.
    pub fn final_array_element_type(&self, id: TypeId) -> TypeId {
        let mut id = id;
        while self.get(id).base == BasicType::Array {
            id = self.get(id).pointed.expect("array without element type");
        }
        id
    }

    pub fn pointed_type(&self, id: TypeId) -> Option<TypeId> {
        self.get(id).pointed
    }

    /// Structural equality ignoring `const` at every level.
    pub fn same_types_modulo_const(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        let (da, db) = (self.get(a), self.get(b));
        if da.base != db.base
            || da.is_signed != db.is_signed
            || da.is_union != db.is_union
            || da.class_name != db.class_name
            || da.num_array_elements != db.num_array_elements
            || da.signature != db.signature
        {
            return false;
        }
        match (da.pointed, db.pointed) {
            (None, None) => true,
            (Some(pa), Some(pb)) => self.same_types_modulo_const(pa, pb),
            _ => false,
        }
    }

    /// True when both are pointers or arrays whose pointed-to types
    /// differ only by signedness (and possibly const).
    pub fn same_pointer_or_array_types_modulo_signedness(&self, a: TypeId, b: TypeId) -> bool {
        let (da, db) = (self.get(a), self.get(b));
        if !da.is_ptr_or_array() || !db.is_ptr_or_array() {
            return false;
        }
        let (pa, pb) = match (da.pointed, db.pointed) {
            (Some(pa), Some(pb)) => (pa, pb),
            _ => return false,
        };
        let (dpa, dpb) = (self.get(pa), self.get(pb));
        dpa.base == dpb.base
            && dpa.class_name == dpb.class_name
            && dpa.num_array_elements == dpb.num_array_elements
            && match (dpa.pointed, dpb.pointed) {
                (None, None) => true,
                (Some(x), Some(y)) => self.same_types_modulo_const(x, y),
                _ => false,
            }
    }

    pub fn is_ptr_to_function(&self, id: TypeId) -> bool {
        let desc = self.get(id);
        desc.base == BasicType::Pointer
            && desc
                .pointed
                .map(|p| self.get(p).base == BasicType::Function)
                .unwrap_or(false)
    }

    /// Human-readable rendering for diagnostics.
    pub fn type_to_string(&self, id: TypeId) -> String {
        let desc = self.get(id);
        let mut s = String::new();
        if desc.is_constant {
            s.push_str("const ");
        }
        match desc.base {
            BasicType::Void => s.push_str("void"),
            BasicType::Byte => s.push_str(if desc.is_signed { "char" } else { "unsigned char" }),
            BasicType::Word => s.push_str(if desc.is_signed { "int" } else { "unsigned int" }),
            BasicType::Sizeless => s.push_str("<sizeless>"),
            BasicType::Pointer => {
                let p = desc.pointed.expect("pointer without pointee");
                if self.get(p).base == BasicType::Function {
                    s.push_str(&format!("{} (*)()", self.function_return_string(p)));
                } else {
                    s.push_str(&self.type_to_string(p));
                    s.push_str(" *");
                }
            }
            BasicType::Array => {
                let p = desc.pointed.expect("array without element type");
                s.push_str(&self.type_to_string(p));
                s.push_str("[]");
            }
            BasicType::Function => {
                s.push_str(&self.function_return_string(id));
                s.push_str(" ()");
            }
            BasicType::Class => match desc.class_name.as_str() {
                LONG_CLASS_NAME => s.push_str("long"),
                ULONG_CLASS_NAME => s.push_str("unsigned long"),
                SINGLE_CLASS_NAME => s.push_str("float"),
                DOUBLE_CLASS_NAME => s.push_str("double"),
                name => {
                    s.push_str(if desc.is_union { "union " } else { "struct " });
                    s.push_str(name);
                }
            },
        }
        s
    }

    fn function_return_string(&self, id: TypeId) -> String {
        match &self.get(id).signature {
            Some(sig) => self.type_to_string(sig.return_type),
            None => "int".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_gives_identical_ids() {
        let mut tm = TypeManager::new();
        let a = tm.basic_type(BasicType::Word, true);
        let b = tm.basic_type(BasicType::Word, true);
        assert_eq!(a, b);
        let pa = tm.pointer_to(a);
        let pb = tm.pointer_to(b);
        assert_eq!(pa, pb);
        let c = tm.basic_type(BasicType::Word, false);
        assert_ne!(a, c);
    }

    #[test]
    fn long_and_real_sizes() {
        let mut tm = TypeManager::new();
        let l = tm.long_type(true);
        let ul = tm.long_type(false);
        let f = tm.real_type(false);
        let d = tm.real_type(true);
        assert_eq!(tm.size_of(l), Some(4));
        assert_eq!(tm.size_of(ul), Some(4));
        assert_eq!(tm.size_of(f), Some(5));
        assert_eq!(tm.size_of(d), Some(5));
        assert!(tm.get(l).is_long());
        assert!(tm.get(l).is_signed);
        assert!(!tm.get(ul).is_signed);
        assert!(tm.get(d).is_real());
    }

    #[test]
    fn array_size_and_incomplete_array() {
        let mut tm = TypeManager::new();
        let ch = tm.basic_type(BasicType::Byte, true);
        let full = tm.array_of(ch, &[Some(2), Some(3)]);
        assert_eq!(tm.size_of(full), Some(6));
        let open = tm.array_of(ch, &[None, Some(3)]);
        assert_eq!(tm.size_of(open), None);
        assert_eq!(tm.final_array_element_type(full), ch);
    }

    #[test]
    fn struct_layout_and_union_layout() {
        let mut tm = TypeManager::new();
        let word = tm.basic_type(BasicType::Word, true);
        let byte = tm.basic_type(BasicType::Byte, true);
        tm.declare_class(ClassDef {
            name: "S".to_string(),
            is_union: false,
            members: vec![
                ClassMember {
                    name: "x".to_string(),
                    member_type: word,
                    dims: SmallVec::new(),
                },
                ClassMember {
                    name: "c".to_string(),
                    member_type: byte,
                    dims: SmallVec::new(),
                },
                ClassMember {
                    name: "y".to_string(),
                    member_type: word,
                    dims: SmallVec::new(),
                },
            ],
        });
        let s = tm.class_type("S", false);
        assert_eq!(tm.size_of(s), Some(5));
        assert_eq!(tm.member_offset("S", "x"), Some(0));
        assert_eq!(tm.member_offset("S", "c"), Some(2));
        assert_eq!(tm.member_offset("S", "y"), Some(3));

        tm.declare_class(ClassDef {
            name: "U".to_string(),
            is_union: true,
            members: vec![
                ClassMember {
                    name: "w".to_string(),
                    member_type: word,
                    dims: SmallVec::new(),
                },
                ClassMember {
                    name: "c".to_string(),
                    member_type: byte,
                    dims: SmallVec::new(),
                },
            ],
        });
        let u = tm.class_type("U", true);
        assert_eq!(tm.size_of(u), Some(2));
        assert_eq!(tm.member_offset("U", "c"), Some(0));
    }

    #[test]
    fn incomplete_struct_has_no_size() {
        let mut tm = TypeManager::new();
        let s = tm.class_type("Opaque", false);
        assert_eq!(tm.size_of(s), None);
    }

    #[test]
    fn modulo_const_and_signedness_comparisons() {
        let mut tm = TypeManager::new();
        let ch = tm.basic_type(BasicType::Byte, true);
        let cch = tm.with_const(ch);
        let uch = tm.basic_type(BasicType::Byte, false);
        let p_ch = tm.pointer_to(ch);
        let p_cch = tm.pointer_to(cch);
        let p_uch = tm.pointer_to(uch);
        assert!(tm.same_types_modulo_const(p_ch, p_cch));
        assert!(!tm.same_types_modulo_const(p_ch, p_uch));
        assert!(tm.same_pointer_or_array_types_modulo_signedness(p_ch, p_uch));
    }

    #[test]
    fn enumerators() {
        let mut tm = TypeManager::new();
        let word = tm.basic_type(BasicType::Word, true);
        assert!(tm.declare_enumerator("RED", 0, Some("Color"), word));
        assert!(tm.declare_enumerator("GREEN", 1, Some("Color"), word));
        assert!(!tm.declare_enumerator("RED", 9, Some("Color"), word));
        assert_eq!(tm.enumerator_value("GREEN"), Some(1));
        assert_eq!(tm.enumerator_type("BLUE"), None);
        assert!(tm.is_enumerator_name("RED"));
    }

    #[test]
    fn type_rendering() {
        let mut tm = TypeManager::new();
        let ch = tm.basic_type(BasicType::Byte, true);
        let p = tm.pointer_to(ch);
        assert_eq!(tm.type_to_string(p), "char *");
        let l = tm.long_type(false);
        assert_eq!(tm.type_to_string(l), "unsigned long");
        let s = tm.class_type("Point", false);
        assert_eq!(tm.type_to_string(s), "struct Point");
    }
}
