use crate::{
    method::{Executor, MethodContext},
    name_object::{name_seg, read_name_string},
    namespace::{AmlHandle, AmlName},
    object::{Method, MethodCode, MethodFlags, Object, ObjectRef, ObjectType, Reference, TypeMask},
    op_region::{FieldFlags, FieldUnit, FieldUnitKind, OpRegion, RegionSpace},
    opcode::{Opcode, TokenKind, ACCESS_FIELD, CONNECT_FIELD, EXTENDED_ACCESS_FIELD, RESERVED_FIELD},
    pkg_length::{pkg_length, raw_pkg_length},
    AmlError,
    DebugVerbosity,
};
use alloc::{string::String, vec::Vec};
use bit_field::BitField;
use log::{debug, trace, warn};

/// The value returned by the `Revision` opcode.
pub const INTERPRETER_REVISION: u64 = 2;

/// How execution of a term list stopped. Anything other than `Normal` unwinds through enclosing term lists
/// until something (a loop, or the method invocation) handles it.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(ObjectRef),
    Break,
    Continue,
}

impl Executor<'_> {
    /// Execute terms until the end of the current region, or until one of them stops with something other than
    /// `Flow::Normal`.
    pub(crate) fn term_list(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        while !context.stream.at_end() {
            match self.term(context)? {
                Flow::Normal => (),
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn term(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        self.enter_nesting()?;
        let result = self.nested_term(context);
        self.leave_nesting();
        result
    }

    fn nested_term(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        if DebugVerbosity::AllScopes <= self.config.debug_verbosity {
            trace!("{:#x}: {}", context.stream.pc(), opcode.name());
        }

        match opcode.kind() {
            TokenKind::Statement => self.statement(context),
            TokenKind::NamedObject => self.named_object(context),
            TokenKind::NamespaceModifier => self.namespace_modifier(context),
            TokenKind::Expression | TokenKind::Data | TokenKind::Name | TokenKind::Local | TokenKind::Arg => {
                let result = self.term_arg(context)?;
                context.last_result = Some(result);
                Ok(Flow::Normal)
            }
            TokenKind::Debug => Err(AmlError::UnexpectedOpcode(opcode)),
        }
    }

    /// Evaluate a `TermArg`: an expression, a data object, a name, or an argument or local.
    pub(crate) fn term_arg(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        self.enter_nesting()?;
        let result = self.nested_term_arg(context);
        self.leave_nesting();
        result
    }

    fn nested_term_arg(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        match opcode {
            Opcode::Local(local) => {
                context.stream.opcode()?;
                Ok(context.locals[local as usize].share())
            }
            Opcode::Arg(arg) => {
                context.stream.opcode()?;
                Ok(context.args[arg as usize].share())
            }
            _ => match opcode.kind() {
                TokenKind::Expression => self.expression(context),
                TokenKind::Data => self.computational_data(context),
                TokenKind::Name => self.name_term(context),
                _ => Err(AmlError::UnexpectedOpcode(opcode)),
            },
        }
    }

    pub(crate) fn term_arg_integer(&mut self, context: &mut MethodContext) -> Result<u64, AmlError> {
        let value = self.term_arg(context)?;
        let value = self.convert(value, TypeMask::INTEGER)?;
        let value = value.lock().as_integer()?;
        Ok(value)
    }

    /// Run `f` with the stream restricted to end at `end`, then move to `end`, whatever `f` did or didn't
    /// consume.
    pub(crate) fn in_region<'s, T, F>(
        &mut self,
        context: &mut MethodContext<'s>,
        end: usize,
        f: F,
    ) -> Result<T, AmlError>
    where
        F: FnOnce(&mut Self, &mut MethodContext<'s>) -> Result<T, AmlError>,
    {
        let outer_end = context.stream.narrow(end)?;
        let result = f(self, context);
        context.stream.restore_end(outer_end);
        let result = result?;
        context.stream.seek(end)?;
        Ok(result)
    }

    fn term_list_in_scope(&mut self, context: &mut MethodContext, scope: AmlName) -> Result<Flow, AmlError> {
        if DebugVerbosity::Scopes <= self.config.debug_verbosity {
            trace!("Entering scope {}", scope);
        }
        let outer_scope = core::mem::replace(&mut context.scope, scope);
        let flow = self.term_list(context);
        let scope = core::mem::replace(&mut context.scope, outer_scope);
        if DebugVerbosity::Scopes <= self.config.debug_verbosity {
            trace!("Leaving scope {}", scope);
        }
        flow
    }

    /// Define a new named object, relative to the current scope. A placeholder left by `External` is filled in
    /// rather than colliding.
    pub(crate) fn add_named(
        &mut self,
        context: &MethodContext,
        name: &AmlName,
        object: Object,
    ) -> Result<AmlHandle, AmlError> {
        let path = name.resolve(&context.scope)?;
        let (parent, seg) = self.namespace.parent_of_path(&path)?;
        let typ = object.typ();

        if let Some(existing) = self.namespace.child(parent, seg) {
            if self.namespace.get(existing)?.typ() == ObjectType::Uninitialized {
                let object = self.wrap(object);
                self.namespace.replace(existing, object)?;
                debug!("Defined {:?} at {} over external placeholder", typ, path);
                return Ok(existing);
            }
        }

        let handle = self.namespace.add_child(parent, seg, object, context.group)?;
        debug!("Created {:?} at {}", typ, path);
        Ok(handle)
    }

    fn name_term(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let name = read_name_string(&mut context.stream)?;
        let handle = match self.namespace.search(&name, &context.scope) {
            Ok(handle) => handle,
            Err(AmlError::ObjectDoesNotExist(_)) => {
                warn!("Name {} does not resolve from scope {}. Substituting zero.", name, context.scope);
                return Ok(self.integer(0));
            }
            Err(err) => return Err(err),
        };

        let arg_count = match &*self.namespace.get(handle)?.lock() {
            Object::Method(method) => Some(method.flags.arg_count()),
            _ => None,
        };

        match arg_count {
            Some(arg_count) => {
                let mut args = Vec::with_capacity(arg_count);
                for _ in 0..arg_count {
                    args.push(self.term_arg(context)?);
                }
                self.invoke(handle, args)
            }
            None => self.evaluate_handle(handle, Vec::new()),
        }
    }

    fn computational_data(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let value = match context.stream.opcode()? {
            Opcode::Zero => 0,
            Opcode::One => 1,
            Opcode::Ones => u64::MAX,
            Opcode::BytePrefix => context.stream.next()? as u64,
            Opcode::WordPrefix => context.stream.next_u16()? as u64,
            Opcode::DWordPrefix => context.stream.next_u32()? as u64,
            Opcode::QWordPrefix => context.stream.next_u64()?,
            Opcode::Revision => INTERPRETER_REVISION,
            Opcode::StringPrefix => {
                let bytes = context.stream.take_null_terminated()?;
                if !bytes.is_ascii() {
                    return Err(AmlError::InvalidStringConstant);
                }
                let string = core::str::from_utf8(bytes).map_err(|_| AmlError::InvalidStringConstant)?;
                return Ok(self.wrap(Object::String(String::from(string))));
            }
            other => return Err(AmlError::UnexpectedOpcode(other)),
        };
        Ok(self.integer(value))
    }

    /// DefBuffer := BufferOp PkgLength BufferSize ByteList
    pub(crate) fn def_buffer(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let pkg = pkg_length(&mut context.stream)?;
        let bytes = self.in_region(context, pkg.end_offset, |this, context| {
            let size = this.term_arg_integer(context)?;
            let initializer = context.stream.take(context.stream.end() - context.stream.pc())?;
            let size = usize::try_from(size).map_err(|_| AmlError::OutOfMemory)?.max(initializer.len());

            let mut bytes = Vec::new();
            bytes.try_reserve_exact(size).map_err(|_| AmlError::OutOfMemory)?;
            bytes.extend_from_slice(initializer);
            bytes.resize(size, 0);
            Ok(bytes)
        })?;
        Ok(self.wrap(Object::Buffer(bytes)))
    }

    /// DefPackage := PackageOp PkgLength NumElements PackageElementList
    /// DefVarPackage := VarPackageOp PkgLength VarNumElements PackageElementList
    pub(crate) fn def_package(&mut self, context: &mut MethodContext, variable: bool) -> Result<ObjectRef, AmlError> {
        let pkg = pkg_length(&mut context.stream)?;
        let elements = self.in_region(context, pkg.end_offset, |this, context| {
            let num_elements = if variable {
                usize::try_from(this.term_arg_integer(context)?).map_err(|_| AmlError::OutOfMemory)?
            } else {
                context.stream.next()? as usize
            };

            let mut elements = Vec::new();
            while !context.stream.at_end() {
                elements.push(this.package_element(context)?);
            }

            if elements.len() > num_elements {
                warn!("Package has {} elements, but declares {}. Truncating.", elements.len(), num_elements);
                elements.truncate(num_elements);
            }
            elements.try_reserve_exact(num_elements - elements.len()).map_err(|_| AmlError::OutOfMemory)?;
            while elements.len() < num_elements {
                elements.push(this.wrap(Object::Uninitialized));
            }
            Ok(elements)
        })?;
        Ok(self.wrap(Object::Package(elements)))
    }

    /// PackageElement := DataRefObject | NameString
    fn package_element(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        if opcode.kind() != TokenKind::Name {
            return self.term_arg(context);
        }

        // Names in packages are not evaluated: they become references, or strings if they don't resolve yet
        let name = read_name_string(&mut context.stream)?;
        match self.namespace.search(&name, &context.scope) {
            Ok(handle) => {
                let path = self.namespace.path_of(handle)?;
                Ok(self.wrap(Object::Reference(Reference::Named { handle, name: path })))
            }
            Err(AmlError::ObjectDoesNotExist(_)) => Ok(self.wrap(Object::String(name.as_string()))),
            Err(err) => Err(err),
        }
    }

    fn named_object(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        let opcode = context.stream.opcode()?;
        match opcode {
            Opcode::Method => {
                /*
                 * DefMethod := MethodOp PkgLength NameString MethodFlags TermList
                 * The body is only recorded here. It's executed each time the method is invoked.
                 */
                let pkg = pkg_length(&mut context.stream)?;
                self.in_region(context, pkg.end_offset, |this, context| {
                    let name = read_name_string(&mut context.stream)?;
                    let flags = MethodFlags(context.stream.next()?);
                    let code = MethodCode::Aml {
                        stream: context.code.clone(),
                        start: context.stream.pc(),
                        end: pkg.end_offset,
                    };
                    this.add_named(context, &name, Object::Method(Method { flags, code }))
                })?;
            }

            Opcode::External => {
                // DefExternal := ExternalOp NameString ObjectType ArgumentCount
                let name = read_name_string(&mut context.stream)?;
                let _object_type = context.stream.next()?;
                let _arg_count = context.stream.next()?;

                let path = name.resolve(&context.scope)?;
                if self.namespace.lookup(&path).is_err() {
                    if let Err(err) = self.namespace.insert(&path, Object::Uninitialized, context.group) {
                        debug!("Not creating placeholder for external {}: {:?}", path, err);
                    }
                }
            }

            Opcode::Mutex => {
                // DefMutex := MutexOp NameString SyncFlags
                let name = read_name_string(&mut context.stream)?;
                let sync_level = context.stream.next()?.get_bits(0..4);
                self.add_named(context, &name, Object::Mutex { sync_level, depth: 0 })?;
            }

            Opcode::Event => {
                let name = read_name_string(&mut context.stream)?;
                self.add_named(context, &name, Object::Event { pending: 0 })?;
            }

            Opcode::CreateBitField
            | Opcode::CreateByteField
            | Opcode::CreateWordField
            | Opcode::CreateDWordField
            | Opcode::CreateQWordField => {
                // DefCreateXField := CreateXFieldOp SourceBuff ByteIndex NameString
                let buffer = self.term_arg(context)?;
                let index = usize::try_from(self.term_arg_integer(context)?).map_err(|_| AmlError::BufferFieldOutOfBounds)?;
                let name = read_name_string(&mut context.stream)?;

                let (bit_offset, bit_length) = match opcode {
                    Opcode::CreateBitField => (Some(index), 1),
                    Opcode::CreateByteField => (index.checked_mul(8), 8),
                    Opcode::CreateWordField => (index.checked_mul(8), 16),
                    Opcode::CreateDWordField => (index.checked_mul(8), 32),
                    _ => (index.checked_mul(8), 64),
                };
                let bit_offset = bit_offset.ok_or(AmlError::BufferFieldOutOfBounds)?;
                self.create_buffer_field(context, buffer, bit_offset, bit_length, &name)?;
            }

            Opcode::CreateField => {
                // DefCreateField := CreateFieldOp SourceBuff BitIndex NumBits NameString
                let buffer = self.term_arg(context)?;
                let bit_offset = usize::try_from(self.term_arg_integer(context)?).map_err(|_| AmlError::BufferFieldOutOfBounds)?;
                let bit_length = usize::try_from(self.term_arg_integer(context)?).map_err(|_| AmlError::BufferFieldOutOfBounds)?;
                let name = read_name_string(&mut context.stream)?;
                self.create_buffer_field(context, buffer, bit_offset, bit_length, &name)?;
            }

            Opcode::OpRegion => {
                // DefOpRegion := OpRegionOp NameString RegionSpace RegionOffset RegionLen
                let name = read_name_string(&mut context.stream)?;
                let space = RegionSpace::from(context.stream.next()?);
                let base = self.term_arg_integer(context)?;
                let length = self.term_arg_integer(context)?;
                let region = OpRegion { space, base, length, parent_device: Some(context.scope.clone()) };
                self.add_named(context, &name, Object::OpRegion(region))?;
            }

            Opcode::DataRegion => return Err(AmlError::Unimplemented),

            Opcode::Field => {
                // DefField := FieldOp PkgLength NameString FieldFlags FieldList
                let pkg = pkg_length(&mut context.stream)?;
                self.in_region(context, pkg.end_offset, |this, context| {
                    let region = this.named_of_type(context, ObjectType::OpRegion)?;
                    let flags = FieldFlags(context.stream.next()?);
                    this.field_list(context, flags, FieldUnitKind::Normal { region })
                })?;
            }

            Opcode::IndexField => {
                // DefIndexField := IndexFieldOp PkgLength NameString NameString FieldFlags FieldList
                let pkg = pkg_length(&mut context.stream)?;
                self.in_region(context, pkg.end_offset, |this, context| {
                    let index = this.named_of_type(context, ObjectType::FieldUnit)?;
                    let data = this.named_of_type(context, ObjectType::FieldUnit)?;
                    let flags = FieldFlags(context.stream.next()?);
                    this.field_list(context, flags, FieldUnitKind::Index { index, data })
                })?;
            }

            Opcode::BankField => {
                // DefBankField := BankFieldOp PkgLength NameString NameString BankValue FieldFlags FieldList
                let pkg = pkg_length(&mut context.stream)?;
                self.in_region(context, pkg.end_offset, |this, context| {
                    let region = this.named_of_type(context, ObjectType::OpRegion)?;
                    let bank = this.named_of_type(context, ObjectType::FieldUnit)?;
                    let bank_value = this.term_arg_integer(context)?;
                    let flags = FieldFlags(context.stream.next()?);
                    this.field_list(context, flags, FieldUnitKind::Bank { region, bank, bank_value })
                })?;
            }

            Opcode::Device | Opcode::ThermalZone => {
                // DefDevice := DeviceOp PkgLength NameString TermList
                let pkg = pkg_length(&mut context.stream)?;
                return self.in_region(context, pkg.end_offset, |this, context| {
                    let name = read_name_string(&mut context.stream)?;
                    let object = if opcode == Opcode::Device { Object::Device } else { Object::ThermalZone };
                    let handle = this.add_named(context, &name, object)?;
                    let scope = this.namespace.path_of(handle)?;
                    this.term_list_in_scope(context, scope)
                });
            }

            Opcode::Processor => {
                // DefProcessor := ProcessorOp PkgLength NameString ProcID PblkAddress PblkLen TermList
                let pkg = pkg_length(&mut context.stream)?;
                return self.in_region(context, pkg.end_offset, |this, context| {
                    let name = read_name_string(&mut context.stream)?;
                    let proc_id = context.stream.next()?;
                    let pblk_address = context.stream.next_u32()?;
                    let pblk_length = context.stream.next()?;
                    let handle =
                        this.add_named(context, &name, Object::Processor { proc_id, pblk_address, pblk_length })?;
                    let scope = this.namespace.path_of(handle)?;
                    this.term_list_in_scope(context, scope)
                });
            }

            Opcode::PowerRes => {
                // DefPowerRes := PowerResOp PkgLength NameString SystemLevel ResourceOrder TermList
                let pkg = pkg_length(&mut context.stream)?;
                return self.in_region(context, pkg.end_offset, |this, context| {
                    let name = read_name_string(&mut context.stream)?;
                    let system_level = context.stream.next()?;
                    let resource_order = context.stream.next_u16()?;
                    let handle =
                        this.add_named(context, &name, Object::PowerResource { system_level, resource_order })?;
                    let scope = this.namespace.path_of(handle)?;
                    this.term_list_in_scope(context, scope)
                });
            }

            other => return Err(AmlError::UnexpectedOpcode(other)),
        }

        Ok(Flow::Normal)
    }

    fn namespace_modifier(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        match context.stream.opcode()? {
            Opcode::Alias => {
                // DefAlias := AliasOp NameString NameString
                let source = read_name_string(&mut context.stream)?;
                let alias = read_name_string(&mut context.stream)?;
                let target = self.namespace.search(&source, &context.scope)?;
                self.add_named(context, &alias, Object::Alias(target))?;
                Ok(Flow::Normal)
            }

            Opcode::Name => {
                // DefName := NameOp NameString DataRefObject
                let name = read_name_string(&mut context.stream)?;
                let value = self.term_arg(context)?;
                let value = value.lock().deep_copy(self.namespace.tracker());
                self.add_named(context, &name, value)?;
                Ok(Flow::Normal)
            }

            Opcode::Scope => {
                // DefScope := ScopeOp PkgLength NameString TermList
                let pkg = pkg_length(&mut context.stream)?;
                self.in_region(context, pkg.end_offset, |this, context| {
                    let name = read_name_string(&mut context.stream)?;
                    let handle = match this.namespace.search(&name, &context.scope) {
                        Ok(handle) => handle,
                        Err(AmlError::ObjectDoesNotExist(_)) => {
                            let path = name.resolve(&context.scope)?;
                            debug!("Scope {} does not exist. Creating it.", path);
                            this.namespace.insert(&path, Object::PredefinedScope, context.group)?
                        }
                        Err(err) => return Err(err),
                    };
                    let scope = this.namespace.path_of(handle)?;
                    this.term_list_in_scope(context, scope)
                })
            }

            other => Err(AmlError::UnexpectedOpcode(other)),
        }
    }

    /// Read a name, and get the object it refers to, checking it's of the expected type.
    fn named_of_type(&mut self, context: &mut MethodContext, expected: ObjectType) -> Result<ObjectRef, AmlError> {
        let name = read_name_string(&mut context.stream)?;
        let handle = self.namespace.search(&name, &context.scope)?;
        let object = self.namespace.get(handle)?;
        match object.typ() {
            got if got == expected => Ok(object),
            got => Err(AmlError::ObjectNotOfExpectedType { expected, got }),
        }
    }

    fn create_buffer_field(
        &mut self,
        context: &MethodContext,
        buffer: ObjectRef,
        bit_offset: usize,
        bit_length: usize,
        name: &AmlName,
    ) -> Result<(), AmlError> {
        let buffer = self.follow_reference(buffer)?;
        let buffer_bits = match &*buffer.lock() {
            Object::Buffer(bytes) => bytes.len() * 8,
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Buffer, got: other.typ() }),
        };
        match bit_offset.checked_add(bit_length) {
            Some(end) if end <= buffer_bits && bit_length > 0 => (),
            _ => return Err(AmlError::BufferFieldOutOfBounds),
        }

        self.add_named(context, name, Object::BufferField { buffer, bit_offset, bit_length })?;
        Ok(())
    }

    /*
     * FieldList := Nothing | <FieldElement FieldList>
     * FieldElement := NamedField | ReservedField | AccessField | ExtendedAccessField | ConnectField
     * NamedField := NameSeg PkgLength
     * ReservedField := 0x00 PkgLength
     * AccessField := 0x01 AccessType AccessAttrib
     * ConnectField := <0x02 NameString> | <0x02 BufferData>
     * ExtendedAccessField := 0x03 AccessType ExtendedAccessAttrib AccessLength
     *
     * The PkgLengths here are bit counts, not byte lengths, so they're read raw.
     */
    fn field_list(
        &mut self,
        context: &mut MethodContext,
        mut flags: FieldFlags,
        kind: FieldUnitKind,
    ) -> Result<(), AmlError> {
        let mut bit_index = 0;
        while !context.stream.at_end() {
            match context.stream.peek()? {
                RESERVED_FIELD => {
                    context.stream.next()?;
                    bit_index += raw_pkg_length(&mut context.stream)? as usize;
                }
                ACCESS_FIELD => {
                    context.stream.next()?;
                    let access_type = context.stream.next()?;
                    let _access_attrib = context.stream.next()?;
                    flags = flags.with_access_type(access_type);
                }
                EXTENDED_ACCESS_FIELD => {
                    context.stream.next()?;
                    let access_type = context.stream.next()?;
                    let _access_attrib = context.stream.next()?;
                    let _access_length = context.stream.next()?;
                    flags = flags.with_access_type(access_type);
                }
                CONNECT_FIELD => {
                    context.stream.next()?;
                    if context.stream.expect_opcode(Opcode::Buffer)? {
                        self.def_buffer(context)?;
                    } else {
                        read_name_string(&mut context.stream)?;
                    }
                    debug!("Ignoring connection of field list to a GenericSerialBus or GPIO resource");
                }
                _ => {
                    let seg = name_seg(&mut context.stream)?;
                    let bit_length = raw_pkg_length(&mut context.stream)? as usize;
                    let field = FieldUnit { kind: kind.clone(), flags, bit_index, bit_length };
                    self.add_named(context, &AmlName::from_name_seg(seg), Object::FieldUnit(field))?;
                    bit_index += bit_length;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn data_objects() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("BYTE", &[0x0a, 0x2a])[..],
            &name("WORD", &[0x0b, 0x34, 0x12]),
            &name("DWRD", &[0x0c, 0x78, 0x56, 0x34, 0x12]),
            &name("QWRD", &[0x0e, 0xef, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23, 0x01]),
            &name("STR_", b"\x0dHello\0"),
            &name("ONES", &[0xff]),
            &name("REV_", &[0x5b, 0x30]),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        check_ok!(interpreter.evaluate("\\BYTE"), Object::Integer(0x2a));
        check_ok!(interpreter.evaluate("\\WORD"), Object::Integer(0x1234));
        check_ok!(interpreter.evaluate("\\DWRD"), Object::Integer(0x12345678));
        check_ok!(interpreter.evaluate("\\QWRD"), Object::Integer(0x0123456789abcdef));
        check_ok!(interpreter.evaluate("\\STR_"), Object::String(s) if s == "Hello");
        check_ok!(interpreter.evaluate("\\ONES"), Object::Integer(u64::MAX));
        check_ok!(interpreter.evaluate("\\REV_"), Object::Integer(INTERPRETER_REVISION));
    }

    #[test]
    fn ones_is_truncated_in_revision_1_tables() {
        let interpreter = test_interpreter_with(crate::Config { dsdt_revision: 1, ..Default::default() });
        check_ok!(interpreter.load_table(&name("ONES", &[0xff])));
        check_ok!(interpreter.evaluate("\\ONES"), Object::Integer(0xffff_ffff));
    }

    #[test]
    fn buffers_are_zero_extended() {
        let interpreter = test_interpreter();
        // Name(BUF, Buffer(5) { 1, 2 })
        let table = name("BUF_", &[&[0x11][..], &pkg(&[&[0x0a, 0x05][..], &[0x01, 0x02]].concat())].concat());
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\BUF_"), Object::Buffer(b) if b == [1, 2, 0, 0, 0]);
    }

    #[test]
    fn packages() {
        let interpreter = test_interpreter();
        // Name(INT_, 3); Name(PKG_, Package(4) { 1, "a", INT_, MISS })
        #[rustfmt::skip]
        let table = [
            &name("INT_", &[0x0a, 0x03])[..],
            &name("PKG_", &[&[0x12][..], &pkg(&[
                &[0x04][..],
                &[0x01],
                b"\x0da\0",
                b"INT_",
                b"MISS",
            ].concat())].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        let Ok(Object::Package(elements)) = interpreter.evaluate("\\PKG_") else { panic!() };
        assert_eq!(elements.len(), 4);
        assert!(matches!(*elements[0].lock(), Object::Integer(1)));
        assert!(matches!(&*elements[1].lock(), Object::String(s) if s == "a"));
        assert!(matches!(&*elements[2].lock(), Object::Reference(Reference::Named { name, .. }) if name.as_string() == "\\INT_"));
        assert!(matches!(&*elements[3].lock(), Object::String(s) if s == "MISS"));
    }

    #[test]
    fn short_packages_are_padded_with_uninitialized() {
        let interpreter = test_interpreter();
        let table = name("PKG_", &[&[0x12][..], &pkg(&[0x03, 0x01])].concat());
        check_ok!(interpreter.load_table(&table));

        let Ok(Object::Package(elements)) = interpreter.evaluate("\\PKG_") else { panic!() };
        assert_eq!(elements.len(), 3);
        assert!(matches!(*elements[2].lock(), Object::Uninitialized));
    }

    #[test]
    fn devices_define_scopes() {
        let interpreter = test_interpreter();
        // Scope(\_SB) { Device(PCI0) { Name(_ADR, 0) } }
        #[rustfmt::skip]
        let table = [&[0x10][..], &pkg(&[
            &b"\\_SB_"[..],
            &[0x5b, 0x82], &pkg(&[&b"PCI0"[..], &name("_ADR", &[0x00])].concat()),
        ].concat())].concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\_SB.PCI0"), Object::Device);
        check_ok!(interpreter.evaluate("\\_SB.PCI0._ADR"), Object::Integer(0));
    }

    #[test]
    fn scope_creates_missing_nodes() {
        let interpreter = test_interpreter();
        let table = [&[0x10][..], &pkg(&[&b"\\FOO_"[..], &name("BAR_", &[0x01])].concat())].concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\FOO_.BAR_"), Object::Integer(1));
    }

    #[test]
    fn name_collisions() {
        let interpreter = test_interpreter();
        let table = [name("FOO_", &[0x01]), name("FOO_", &[0x00])].concat();
        check_err!(interpreter.load_table(&table), AmlError::NameCollision(_));
        check_err_kind!(interpreter.load_table(&name("FOO_", &[0x00])), crate::ErrorKind::AlreadyExists);
    }

    #[test]
    fn externals_are_filled_in() {
        let interpreter = test_interpreter();
        // External(\FOO_, IntObj); Name(\FOO_, 7)
        let table = [&[0x15][..], b"\\FOO_", &[0x01, 0x00], &name("\\FOO_", &[0x0a, 0x07])].concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\FOO_"), Object::Integer(7));
    }

    #[test]
    fn aliases() {
        let interpreter = test_interpreter();
        let table = [&name("FOO_", &[0x0a, 0x05])[..], &[0x06], b"FOO_", b"BAR_"].concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\BAR_"), Object::Integer(5));
    }

    #[test]
    fn mutexes_and_events() {
        let interpreter = test_interpreter();
        let table = [&[0x5b, 0x01][..], b"MUTX", &[0x07], &[0x5b, 0x02], b"EVNT"].concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MUTX"), Object::Mutex { sync_level: 7, depth: 0 });
        check_ok!(interpreter.evaluate("\\EVNT"), Object::Event { pending: 0 });
    }

    #[test]
    fn buffer_fields() {
        let interpreter = test_interpreter();
        // Name(BUF_, Buffer(4) { 0x78, 0x56, 0x34, 0x12 }); CreateWordField(BUF_, 1, WRD_); CreateBitField(BUF_, 3, BIT_)
        #[rustfmt::skip]
        let table = [
            &name("BUF_", &[&[0x11][..], &pkg(&[0x0a, 0x04, 0x78, 0x56, 0x34, 0x12])].concat())[..],
            &[0x8b], b"BUF_", &[0x01], b"WRD_",
            &[0x8d], b"BUF_", &[0x0a, 0x03], b"BIT_",
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\WRD_"), Object::Integer(0x3456));
        check_ok!(interpreter.evaluate("\\BIT_"), Object::Integer(1));

        let out_of_bounds = [&[0x8a][..], b"BUF_", &[0x0a, 0x02], b"DWRD"].concat();
        check_err!(interpreter.load_table(&out_of_bounds), AmlError::BufferFieldOutOfBounds);
    }

    #[test]
    fn fields_are_laid_out_in_order() {
        let interpreter = test_interpreter();
        // OperationRegion(REG_, SystemMemory, 0x1000, 0x10)
        // Field(REG_, ByteAcc, NoLock, Preserve) { FLD1, 8, Offset(2), FLD2, 16 }
        #[rustfmt::skip]
        let table = [
            &[0x5b, 0x80][..], b"REG_", &[0x00], &[0x0b, 0x00, 0x10], &[0x0a, 0x10],
            &[0x5b, 0x81], &pkg(&[
                &b"REG_"[..], &[0x01],
                b"FLD1", &[0x08],
                &[0x00, 0x08],
                b"FLD2", &[0x10],
            ].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        let Ok(Object::FieldUnit(field)) = interpreter.namespace_object("\\FLD2") else { panic!() };
        assert_eq!(field.bit_index, 16);
        assert_eq!(field.bit_length, 16);
        let Ok(Object::OpRegion(region)) = interpreter.evaluate("\\REG_") else { panic!() };
        assert_eq!((region.base, region.length), (0x1000, 0x10));
        assert_eq!(region.parent_device, Some(AmlName::root()));
    }

    #[test]
    fn data_regions_are_unimplemented() {
        let interpreter = test_interpreter();
        let table = [&[0x5b, 0x88][..], b"DREG", b"\x0dFACP\0", b"\x0d\0", b"\x0d\0"].concat();
        check_err_kind!(interpreter.load_table(&table), crate::ErrorKind::Unimplemented);
    }
}
