use crate::{
    namespace::{AmlHandle, AmlName, LoadGroup, NameSeg, Namespace},
    object::{MethodCode, Object, ObjectRef, ObjectType},
    op_region::{read_buffer_field, FieldUnit},
    stream::AmlStream,
    term_object::Flow,
    AmlError,
    Config,
    DebugVerbosity,
    Handler,
};
use alloc::{sync::Arc, vec::Vec};
use log::trace;

/// The deepest nesting of method invocations allowed. Firmware that recurses deeper than this is assumed to be
/// broken, and is stopped before it exhausts the stack.
pub const MAX_METHOD_DEPTH: usize = 64;

/// The deepest nesting of terms allowed, counted across method invocations. Each nested expression, package
/// element or statement body is one level. Deeper AML fails with `AmlError::NestingTooDeep`, which bounds the
/// stack the interpreter can use.
pub const MAX_NESTING_DEPTH: usize = 256;

pub const MAX_ARGS: usize = 7;
pub const MAX_LOCALS: usize = 8;

/// The state of one term list being executed: a table being loaded, or the body of a method invocation.
pub(crate) struct MethodContext<'s> {
    /// The whole block of AML the stream is over. Methods defined in this block share it.
    pub code: &'s Arc<[u8]>,
    pub stream: AmlStream<'s>,
    pub scope: AmlName,
    /// The load group that named objects created by this context belong to.
    pub group: LoadGroup,
    pub locals: [ObjectRef; MAX_LOCALS],
    pub args: [ObjectRef; MAX_ARGS],
    /// The result of the last expression executed as a statement. Used for implicit returns.
    pub last_result: Option<ObjectRef>,
}

impl<'s> MethodContext<'s> {
    pub fn new(
        namespace: &Namespace,
        code: &'s Arc<[u8]>,
        start: usize,
        end: usize,
        scope: AmlName,
        group: LoadGroup,
    ) -> Result<MethodContext<'s>, AmlError> {
        let tracker = namespace.tracker();
        Ok(MethodContext {
            code,
            stream: AmlStream::with_range(code, start, end)?,
            scope,
            group,
            locals: core::array::from_fn(|_| tracker.wrap(Object::Uninitialized)),
            args: core::array::from_fn(|_| tracker.wrap(Object::Uninitialized)),
            last_result: None,
        })
    }
}

/// Executes AML against a namespace. One `Executor` lives for the duration of a single call into the
/// `Interpreter`, while the namespace lock is held.
pub(crate) struct Executor<'a> {
    pub handler: &'a dyn Handler,
    pub config: &'a Config,
    pub namespace: &'a mut Namespace,
    depth: usize,
    nesting: usize,
    /// The current synchronization level. Raised by serialized methods and by acquiring mutexes.
    pub(crate) sync_level: u8,
    /// The sync levels to return to as acquired mutexes are released.
    pub(crate) sync_stack: Vec<u8>,
}

impl<'a> Executor<'a> {
    pub fn new(handler: &'a dyn Handler, config: &'a Config, namespace: &'a mut Namespace) -> Executor<'a> {
        Executor { handler, config, namespace, depth: 0, nesting: 0, sync_level: 0, sync_stack: Vec::new() }
    }

    /// The width of integers, in bits. Tables with a revision of less than 2 use 32-bit integers.
    pub fn integer_width(&self) -> usize {
        if self.config.dsdt_revision < 2 {
            32
        } else {
            64
        }
    }

    pub fn mask(&self, value: u64) -> u64 {
        if self.integer_width() == 32 {
            value & 0xffff_ffff
        } else {
            value
        }
    }

    /// Go one level deeper into nested terms. Each successful call must be paired with `leave_nesting`.
    pub(crate) fn enter_nesting(&mut self) -> Result<(), AmlError> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(AmlError::NestingTooDeep);
        }
        self.nesting += 1;
        Ok(())
    }

    pub(crate) fn leave_nesting(&mut self) {
        self.nesting -= 1;
    }

    pub fn wrap(&self, object: Object) -> ObjectRef {
        self.namespace.tracker().wrap(object)
    }

    pub fn integer(&self, value: u64) -> ObjectRef {
        self.wrap(Object::Integer(self.mask(value)))
    }

    /// Execute a definition block at the root scope. Its named objects are created in `group`.
    pub fn load_block(&mut self, code: &Arc<[u8]>, group: LoadGroup) -> Result<(), AmlError> {
        let mut context = MethodContext::new(self.namespace, code, 0, code.len(), AmlName::root(), group)?;
        match self.term_list(&mut context)? {
            // A `Return` at the top level of a table just stops it being loaded any further
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break | Flow::Continue => Err(AmlError::BreakOrContinueOutsideLoop),
        }
    }

    /// Invoke the method at `handle`. Arguments are copied into the method's argument slots, so the method
    /// cannot modify the caller's objects through them (unless they are references).
    pub fn invoke(&mut self, handle: AmlHandle, args: Vec<ObjectRef>) -> Result<ObjectRef, AmlError> {
        let method = match self.namespace.get(handle)?.snapshot() {
            Object::Method(method) => method,
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Method, got: other.typ() }),
        };

        let arg_count = method.flags.arg_count();
        if args.len() > MAX_ARGS || args.len() > arg_count {
            return Err(AmlError::TooManyArgs { expected: arg_count, got: args.len() });
        }
        if self.depth >= MAX_METHOD_DEPTH {
            return Err(AmlError::MethodDepthExceeded);
        }

        let path = self.namespace.path_of(handle)?;

        match method.code {
            MethodCode::Native(native) => {
                let args: Vec<Object> = args.iter().map(|arg| arg.snapshot()).collect();
                let result = match native(&args)? {
                    Object::Integer(value) => Object::Integer(self.mask(value)),
                    other => other,
                };
                Ok(self.wrap(result))
            }

            MethodCode::Aml { stream, start, end } => {
                let previous_sync_level = self.sync_level;
                if method.flags.serialize() {
                    if method.flags.sync_level() < self.sync_level {
                        return Err(AmlError::SyncLevelTooLow {
                            current: self.sync_level,
                            requested: method.flags.sync_level(),
                        });
                    }
                    self.sync_level = method.flags.sync_level();
                }

                if self.config.debug_verbosity != DebugVerbosity::None {
                    trace!("Invoking method {} with {} args", path, args.len());
                }

                let group = self.namespace.new_group();
                self.depth += 1;
                let result = self.run_method(&stream, start, end, path.clone(), group, args);
                self.depth -= 1;

                // Objects created by the method go away however it exits
                self.namespace.remove_subtree_by_group(group);
                self.sync_level = previous_sync_level;

                if self.config.debug_verbosity != DebugVerbosity::None {
                    match &result {
                        Ok(value) => trace!("Method {} returned {}", path, value),
                        Err(err) => trace!("Method {} failed: {:?}", path, err),
                    }
                }
                result
            }
        }
    }

    fn run_method(
        &mut self,
        code: &Arc<[u8]>,
        start: usize,
        end: usize,
        scope: AmlName,
        group: LoadGroup,
        args: Vec<ObjectRef>,
    ) -> Result<ObjectRef, AmlError> {
        let mut context = MethodContext::new(self.namespace, code, start, end, scope, group)?;
        for (slot, arg) in context.args.iter_mut().zip(args) {
            let copy = arg.lock().deep_copy(self.namespace.tracker());
            *slot = self.wrap(copy);
        }

        match self.term_list(&mut context)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => {
                if self.config.slack_mode {
                    Ok(context.last_result.take().unwrap_or_else(|| self.integer(0)))
                } else {
                    Ok(self.wrap(Object::Uninitialized))
                }
            }
            Flow::Break | Flow::Continue => Err(AmlError::BreakOrContinueOutsideLoop),
        }
    }

    /// Evaluate the object at a node: methods are invoked with `args`, fields are read, and anything else is
    /// returned as-is.
    pub fn evaluate_handle(&mut self, handle: AmlHandle, args: Vec<ObjectRef>) -> Result<ObjectRef, AmlError> {
        let object = self.namespace.get(handle)?;
        let typ = object.typ();

        match typ {
            ObjectType::Method => self.invoke(handle, args),
            _ if !args.is_empty() => Err(AmlError::TooManyArgs { expected: 0, got: args.len() }),
            ObjectType::Uninitialized => Err(AmlError::ObjectDoesNotExist(self.namespace.path_of(handle)?)),
            _ => self.read_object(object),
        }
    }

    /// Read the value of an object, reading through field units and buffer fields.
    pub fn read_object(&mut self, object: ObjectRef) -> Result<ObjectRef, AmlError> {
        enum Read {
            Field(FieldUnit),
            BufferField { buffer: ObjectRef, bit_offset: usize, bit_length: usize },
            Direct,
        }

        let read = match &*object.lock() {
            Object::FieldUnit(field) => Read::Field(field.clone()),
            Object::BufferField { buffer, bit_offset, bit_length } => {
                Read::BufferField { buffer: buffer.share(), bit_offset: *bit_offset, bit_length: *bit_length }
            }
            _ => Read::Direct,
        };

        match read {
            Read::Field(field) => {
                let value = self.read_field(&field)?;
                Ok(self.wrap(value))
            }
            Read::BufferField { buffer, bit_offset, bit_length } => {
                let value = read_buffer_field(&buffer, bit_offset, bit_length, self.integer_width())?;
                Ok(self.wrap(value))
            }
            Read::Direct => Ok(object),
        }
    }

    /// Evaluate the child `seg` of the object at `parent`, and convert the result to an integer. Returns
    /// `Ok(None)` if the child does not exist.
    pub fn evaluate_child_integer(&mut self, parent: &AmlName, seg: NameSeg) -> Result<Option<u64>, AmlError> {
        let Some(handle) = self.child_handle(parent, seg)? else { return Ok(None) };
        let value = self.evaluate_handle(handle, Vec::new())?;
        let value = value.lock();
        match crate::convert::to_integer(&value, self.integer_width()) {
            Ok(value) => Ok(Some(value)),
            Err(AmlError::InvalidConversion | AmlError::UninitializedValue) => {
                Err(AmlError::InvalidReturnType { expected: ObjectType::Integer, got: value.typ() })
            }
            Err(err) => Err(err),
        }
    }

    /// Find the child `seg` of the node at `parent`, following aliases.
    pub fn child_handle(&self, parent: &AmlName, seg: NameSeg) -> Result<Option<AmlHandle>, AmlError> {
        let parent = self.namespace.lookup(parent)?;
        match self.namespace.child(parent, seg) {
            Some(handle) => Ok(Some(self.namespace.follow_aliases(handle)?)),
            None => Ok(None),
        }
    }
}
