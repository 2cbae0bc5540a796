use crate::{
    namespace::{AmlHandle, AmlName},
    op_region::{FieldUnit, OpRegion},
    AmlError,
};
use alloc::{
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use bit_field::BitField;
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use spinning_top::{Spinlock, SpinlockGuard};

#[derive(Clone, Debug)]
pub enum Object {
    Uninitialized,
    Integer(u64),
    String(String),
    Buffer(Vec<u8>),
    Package(Vec<ObjectRef>),
    BufferField { buffer: ObjectRef, bit_offset: usize, bit_length: usize },
    FieldUnit(FieldUnit),
    Device,
    /// An event, holding the number of signals that have not yet been waited for.
    Event { pending: u64 },
    Method(Method),
    /// A mutex. `depth` counts how many times it has been acquired without a matching release.
    Mutex { sync_level: u8, depth: u16 },
    Reference(Reference),
    OpRegion(OpRegion),
    PowerResource { system_level: u8, resource_order: u16 },
    Processor { proc_id: u8, pblk_address: u32, pblk_length: u8 },
    ThermalZone,
    /// The data transferred by a field with `BufferAcc` access. Treated as a `Buffer` by the conversion rules.
    RawDataBuffer(Vec<u8>),
    /// An alias to another node. Resolved by the namespace whenever the alias is looked up.
    Alias(AmlHandle),
    /// One of the scopes the namespace is created with, such as `\_SB`.
    PredefinedScope,
    Debug,
}

impl Object {
    /// Make a method implemented by the host rather than by AML. Methods can take at most seven arguments.
    pub fn native_method<F>(arg_count: u8, f: F) -> Result<Object, AmlError>
    where
        F: Fn(&[Object]) -> Result<Object, AmlError> + Send + Sync + 'static,
    {
        let flags = MethodFlags::new(arg_count, false, 0)?;
        Ok(Object::Method(Method { flags, code: MethodCode::Native(Arc::new(f)) }))
    }

    /// Returns the `ObjectType` of this object.
    pub fn typ(&self) -> ObjectType {
        match self {
            Object::Uninitialized => ObjectType::Uninitialized,
            Object::Integer(_) => ObjectType::Integer,
            Object::String(_) => ObjectType::String,
            Object::Buffer(_) => ObjectType::Buffer,
            Object::Package(_) => ObjectType::Package,
            Object::BufferField { .. } => ObjectType::BufferField,
            Object::FieldUnit(_) => ObjectType::FieldUnit,
            Object::Device => ObjectType::Device,
            Object::Event { .. } => ObjectType::Event,
            Object::Method(_) => ObjectType::Method,
            Object::Mutex { .. } => ObjectType::Mutex,
            Object::Reference(_) => ObjectType::Reference,
            Object::OpRegion(_) => ObjectType::OpRegion,
            Object::PowerResource { .. } => ObjectType::PowerResource,
            Object::Processor { .. } => ObjectType::Processor,
            Object::ThermalZone => ObjectType::ThermalZone,
            Object::RawDataBuffer(_) => ObjectType::RawDataBuffer,
            Object::Alias(_) => ObjectType::Alias,
            Object::PredefinedScope => ObjectType::PredefinedScope,
            Object::Debug => ObjectType::Debug,
        }
    }

    pub fn as_integer(&self) -> Result<u64, AmlError> {
        match self {
            Object::Integer(value) => Ok(*value),
            other => Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Integer, got: other.typ() }),
        }
    }

    pub fn as_string(&self) -> Result<&str, AmlError> {
        match self {
            Object::String(value) => Ok(value),
            other => Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::String, got: other.typ() }),
        }
    }

    pub fn as_buffer(&self) -> Result<&[u8], AmlError> {
        match self {
            Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => Ok(bytes),
            other => Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Buffer, got: other.typ() }),
        }
    }

    /// Data objects can be stored to, copied, and converted between. Everything else (devices, methods,
    /// mutexes...) is only ever referred to.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Object::Uninitialized
                | Object::Integer(_)
                | Object::String(_)
                | Object::Buffer(_)
                | Object::Package(_)
                | Object::Reference(_)
                | Object::RawDataBuffer(_)
        )
    }

    /// Copy this object so that the copy shares nothing mutable with the original. Package elements are copied
    /// recursively, as storing a package must not alias its elements.
    pub fn deep_copy(&self, tracker: &ObjectTracker) -> Object {
        match self {
            Object::Package(elements) => Object::Package(
                elements.iter().map(|element| tracker.wrap(element.lock().deep_copy(tracker))).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Call `f` on each object this object keeps alive.
    pub(crate) fn for_each_held(&self, f: &mut dyn FnMut(&ObjectRef)) {
        match self {
            Object::Package(elements) => elements.iter().for_each(|element| f(element)),
            Object::BufferField { buffer, .. } => f(buffer),
            Object::FieldUnit(field) => field.for_each_held(f),
            Object::Reference(Reference::Index { target, .. }) => f(target),
            _ => (),
        }
    }

    /// The name used for this object's type when it is implicitly converted to a string (e.g. by `Concat`).
    pub fn descriptive_name(&self) -> &'static str {
        match self {
            Object::Uninitialized => "Uninitialized Object",
            Object::Integer(_) => "Integer",
            Object::String(_) => "String",
            Object::Buffer(_) => "Buffer",
            Object::Package(_) => "Package",
            Object::BufferField { .. } => "Buffer Field",
            Object::FieldUnit(_) => "Field Unit",
            Object::Device => "Device",
            Object::Event { .. } => "Event",
            Object::Method(_) => "Control Method",
            Object::Mutex { .. } => "Mutex",
            Object::Reference(_) => "Reference",
            Object::OpRegion(_) => "Operation Region",
            Object::PowerResource { .. } => "Power Resource",
            Object::Processor { .. } => "Processor",
            Object::ThermalZone => "Thermal Zone",
            Object::RawDataBuffer(_) => "Raw Data Buffer",
            Object::Alias(_) => "Alias",
            Object::PredefinedScope => "Scope",
            Object::Debug => "Debug Object",
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_STRING_CHARS: usize = 32;
        const MAX_BUFFER_BYTES: usize = 8;

        match self {
            Object::Uninitialized => write!(f, "Uninitialized"),
            Object::Integer(value) => write!(f, "Integer({:#X})", value),
            Object::String(value) => {
                if value.chars().count() > MAX_STRING_CHARS {
                    let shown: String = value.chars().take(MAX_STRING_CHARS - 3).collect();
                    write!(f, "String(\"{}...\")", shown)
                } else {
                    write!(f, "String(\"{}\")", value)
                }
            }
            Object::Buffer(bytes) => {
                write!(f, "Buffer(Length={}", bytes.len())?;
                if !bytes.is_empty() {
                    write!(f, ", Content=0x")?;
                    for (i, byte) in bytes.iter().take(MAX_BUFFER_BYTES).enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{:02X}", byte)?;
                    }
                    if bytes.len() > MAX_BUFFER_BYTES {
                        write!(f, "...")?;
                    }
                }
                write!(f, ")")
            }
            Object::Package(elements) => write!(f, "Package(Length={})", elements.len()),
            Object::BufferField { bit_offset, bit_length, .. } => {
                write!(f, "BufferField(BitOffset={}, BitSize={})", bit_offset, bit_length)
            }
            Object::FieldUnit(field) => write!(f, "{}", field),
            Object::Method(method) => match &method.code {
                MethodCode::Aml { start, end, .. } => write!(
                    f,
                    "Method(ArgCount={:#x}, Start={:#x}, End={:#x})",
                    method.flags.arg_count(),
                    start,
                    end
                ),
                MethodCode::Native(_) => write!(f, "Method(ArgCount={:#x}, Native)", method.flags.arg_count()),
            },
            Object::Mutex { sync_level, .. } => write!(f, "Mutex(SyncLevel={})", sync_level),
            Object::Reference(reference) => write!(f, "ObjectReference(Target={})", reference),
            Object::OpRegion(region) => write!(f, "{}", region),
            Object::PowerResource { system_level, resource_order } => {
                write!(f, "PowerResource(SystemLevel={}, ResourceOrder={})", system_level, resource_order)
            }
            Object::Processor { proc_id, pblk_address, pblk_length } => {
                write!(f, "Processor(ProcId={}, PblkAddr={:#x}, PblkLen={})", proc_id, pblk_address, pblk_length)
            }
            Object::RawDataBuffer(bytes) => write!(f, "RawDataBuffer(Length={})", bytes.len()),
            Object::Device => write!(f, "Device"),
            Object::Event { .. } => write!(f, "Event"),
            Object::ThermalZone => write!(f, "ThermalZone"),
            Object::Alias(_) => write!(f, "Alias"),
            Object::PredefinedScope => write!(f, "PredefinedScope"),
            Object::Debug => write!(f, "DebugObject"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Reference {
    /// A reference to a named object. The handle is looked up each time the reference is used, so a
    /// reference to an object that has since been removed fails cleanly. `name` is kept for display.
    Named { handle: AmlHandle, name: AmlName },
    /// A reference to a local or argument. These do not keep the referenced slot alive after its method
    /// returns.
    Slot(WeakObjectRef),
    /// A reference to an element of a `Package`, or a byte of a `Buffer` or `String`.
    Index { target: ObjectRef, index: usize },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Named { name, .. } => write!(f, "'{}'", name),
            Reference::Slot(_) => write!(f, "<argument or local>"),
            Reference::Index { index, .. } => write!(f, "Index({:#x})", index),
        }
    }
}

pub type NativeMethod = Arc<dyn Fn(&[Object]) -> Result<Object, AmlError> + Send + Sync>;

#[derive(Clone)]
pub enum MethodCode {
    /// The body of the method is `stream[start..end]`.
    Aml { stream: Arc<[u8]>, start: usize, end: usize },
    Native(NativeMethod),
}

impl fmt::Debug for MethodCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodCode::Aml { start, end, .. } => write!(f, "Aml({:#x}..{:#x})", start, end),
            MethodCode::Native(_) => write!(f, "Native"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Method {
    pub flags: MethodFlags,
    pub code: MethodCode,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MethodFlags(pub u8);

impl MethodFlags {
    pub fn new(arg_count: u8, serialize: bool, sync_level: u8) -> Result<MethodFlags, AmlError> {
        if arg_count > 7 {
            return Err(AmlError::TooManyArgs { expected: 7, got: arg_count as usize });
        }
        if sync_level > 15 {
            return Err(AmlError::InvalidSyncLevel(sync_level));
        }

        let mut value = 0;
        value.set_bits(0..3, arg_count);
        value.set_bit(3, serialize);
        value.set_bits(4..8, sync_level);
        Ok(MethodFlags(value))
    }

    pub fn arg_count(&self) -> usize {
        self.0.get_bits(0..3) as usize
    }

    pub fn serialize(&self) -> bool {
        self.0.get_bit(3)
    }

    pub fn sync_level(&self) -> u8 {
        self.0.get_bits(4..8)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjectType {
    Uninitialized,
    Integer,
    String,
    Buffer,
    Package,
    BufferField,
    FieldUnit,
    Device,
    Event,
    Method,
    Mutex,
    Reference,
    OpRegion,
    PowerResource,
    Processor,
    ThermalZone,
    RawDataBuffer,
    Alias,
    PredefinedScope,
    Debug,
}

impl ObjectType {
    /// The value `ObjectTypeOp` returns for an object of this type.
    pub fn type_code(&self) -> u64 {
        match self {
            ObjectType::Uninitialized => 0,
            ObjectType::Integer => 1,
            ObjectType::String => 2,
            ObjectType::Buffer | ObjectType::RawDataBuffer => 3,
            ObjectType::Package => 4,
            ObjectType::FieldUnit => 5,
            ObjectType::Device => 6,
            ObjectType::Event => 7,
            ObjectType::Method => 8,
            ObjectType::Mutex => 9,
            ObjectType::OpRegion => 10,
            ObjectType::PowerResource => 11,
            ObjectType::Processor => 12,
            ObjectType::ThermalZone => 13,
            ObjectType::BufferField => 14,
            ObjectType::Debug => 16,
            ObjectType::Reference | ObjectType::Alias | ObjectType::PredefinedScope => 0,
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// A set of `ObjectType`s, used to describe which types an operand may be converted to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TypeMask(u32);

impl TypeMask {
    pub const INTEGER: TypeMask = TypeMask(1 << ObjectType::Integer as u32);
    pub const STRING: TypeMask = TypeMask(1 << ObjectType::String as u32);
    pub const BUFFER: TypeMask = TypeMask(1 << ObjectType::Buffer as u32 | 1 << ObjectType::RawDataBuffer as u32);
    pub const PACKAGE: TypeMask = TypeMask(1 << ObjectType::Package as u32);
    pub const COMPUTATIONAL: TypeMask = TypeMask(Self::INTEGER.0 | Self::STRING.0 | Self::BUFFER.0);
    pub const DATA: TypeMask = TypeMask(Self::COMPUTATIONAL.0 | Self::PACKAGE.0);

    pub fn of(typ: ObjectType) -> TypeMask {
        TypeMask(typ.bit())
    }

    pub fn contains(&self, typ: ObjectType) -> bool {
        self.0 & typ.bit() != 0
    }
}

impl core::ops::BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, other: TypeMask) -> TypeMask {
        TypeMask(self.0 | other.0)
    }
}

/// Counts the objects that are currently alive. Every `ObjectRef` is created through a tracker, and
/// decrements its count when the last reference to it is dropped.
#[derive(Clone, Default)]
pub struct ObjectTracker(Arc<AtomicUsize>);

impl ObjectTracker {
    pub fn new() -> ObjectTracker {
        ObjectTracker(Arc::new(AtomicUsize::new(0)))
    }

    pub fn wrap(&self, object: Object) -> ObjectRef {
        self.0.fetch_add(1, Ordering::Relaxed);
        ObjectRef(Arc::new(TrackedObject { object: Spinlock::new(object), tracker: self.clone() }))
    }

    /// The number of objects created through this tracker that are still alive.
    pub fn live(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

struct TrackedObject {
    object: Spinlock<Object>,
    tracker: ObjectTracker,
}

impl Drop for TrackedObject {
    fn drop(&mut self) {
        self.tracker.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A shared, reference-counted handle to an `Object`. Cloning a handle (or calling `share`) shares the same
/// object; dropping the last handle frees it.
///
/// The object is behind a spinlock. Locks must only be held for as long as it takes to read or replace the
/// object - never across evaluation of further AML, which may need to lock the same object.
#[derive(Clone)]
pub struct ObjectRef(Arc<TrackedObject>);

impl ObjectRef {
    pub fn lock(&self) -> SpinlockGuard<'_, Object> {
        self.0.object.lock()
    }

    pub fn share(&self) -> ObjectRef {
        self.clone()
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    pub fn typ(&self) -> ObjectType {
        self.lock().typ()
    }

    /// Take a copy of the object as it is right now.
    pub fn snapshot(&self) -> Object {
        self.lock().clone()
    }

    pub fn ptr_eq(a: &ObjectRef, b: &ObjectRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A package can contain a reference to itself, so avoid spinning on a lock we may already hold
        match self.0.object.try_lock() {
            Some(object) => write!(f, "{:?}", *object),
            None => write!(f, "<locked>"),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.object.try_lock() {
            Some(object) => write!(f, "{}", *object),
            None => write!(f, "<locked>"),
        }
    }
}

/// Observes an object without keeping it alive.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<TrackedObject>);

impl WeakObjectRef {
    /// Get a strong handle to the object, if it is still alive.
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "Weak({:?})", object),
            None => write!(f, "Weak(<dropped>)"),
        }
    }
}
