//! `Type2Opcode`s: the expressions. Each produces a value, and many also store it to a target.

use crate::{
    convert,
    method::{Executor, MethodContext},
    name_object::Target,
    namespace::AmlName,
    object::{Object, ObjectRef, ObjectType, Reference, TypeMask},
    op_region::{write_buffer_field, FieldUnit},
    opcode::Opcode,
    AmlError,
};
use alloc::{string::String, vec::Vec};
use core::cmp::Ordering;
use log::info;

/// The value of a logical `True`.
const TRUE: u64 = u64::MAX;

impl Executor<'_> {
    /// Each group of opcodes is handled by its own function, so that a level of expression nesting only costs
    /// the stack of the operator actually being evaluated.
    pub(crate) fn expression(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let opcode = context.stream.opcode()?;
        match opcode {
            Opcode::Buffer => self.def_buffer(context),
            Opcode::Package => self.def_package(context, false),
            Opcode::VarPackage => self.def_package(context, true),

            Opcode::Store => self.def_store(context),
            Opcode::CopyObject => self.def_copy_object(context),

            Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Mod
            | Opcode::ShiftLeft
            | Opcode::ShiftRight
            | Opcode::And
            | Opcode::Nand
            | Opcode::Or
            | Opcode::Nor
            | Opcode::Xor => self.def_binary(context, opcode),
            Opcode::Divide => self.def_divide(context),
            Opcode::Not | Opcode::FindSetLeftBit | Opcode::FindSetRightBit | Opcode::FromBCD | Opcode::ToBCD => {
                self.def_unary(context, opcode)
            }
            Opcode::Increment | Opcode::Decrement => self.def_increment(context, opcode),

            Opcode::LAnd | Opcode::LOr | Opcode::LNot => self.def_logical(context, opcode),
            Opcode::LEqual
            | Opcode::LNotEqual
            | Opcode::LLess
            | Opcode::LLessEqual
            | Opcode::LGreater
            | Opcode::LGreaterEqual => self.def_comparison(context, opcode),

            Opcode::Concat => self.def_concat(context),
            Opcode::ConcatRes => self.def_concat_res(context),
            Opcode::ToBuffer | Opcode::ToDecimalString | Opcode::ToHexString | Opcode::ToInteger => {
                self.def_to_computational(context, opcode)
            }
            Opcode::ToString => self.def_to_string(context),
            Opcode::Mid => self.def_mid(context),

            Opcode::SizeOf => self.def_size_of(context),
            Opcode::ObjectType => self.def_object_type(context),
            Opcode::Index => self.def_index(context),
            Opcode::DerefOf => self.def_deref_of(context),
            Opcode::RefOf => {
                // DefRefOf := RefOfOp SuperName
                let target = self.super_name(context)?;
                self.reference_to(context, &target)
            }
            Opcode::CondRefOf => self.def_cond_ref_of(context),
            Opcode::Match => self.def_match(context),

            Opcode::Acquire => self.def_acquire(context),
            Opcode::Wait => self.def_wait(context),
            Opcode::Timer => Ok(self.integer(self.handler.nanos_since_boot() / 100)),

            Opcode::LoadTable => Err(AmlError::Unimplemented),

            other => Err(AmlError::UnexpectedOpcode(other)),
        }
    }

    /// DefStore := StoreOp TermArg SuperName
    fn def_store(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let value = self.term_arg(context)?;
        let target = self.super_name(context)?;
        self.store(context, value.share(), &target)?;
        Ok(value)
    }

    /// DefCopyObject := CopyObjectOp TermArg SimpleName
    fn def_copy_object(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let value = self.term_arg(context)?;
        let target = self.simple_name(context)?;
        self.copy_object(context, &value, &target)?;
        Ok(value)
    }

    /// DefAdd := AddOp Operand Operand Target, and the other integer operators of the same shape.
    fn def_binary(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let a = self.term_arg_integer(context)?;
        let b = self.term_arg_integer(context)?;
        let target = self.target(context)?;
        let value = match opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Subtract => a.wrapping_sub(b),
            Opcode::Multiply => a.wrapping_mul(b),
            Opcode::Mod => a.checked_rem(b).ok_or(AmlError::DivideByZero)?,
            Opcode::ShiftLeft => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)).unwrap_or(0),
            Opcode::ShiftRight => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)).unwrap_or(0),
            Opcode::And => a & b,
            Opcode::Nand => !(a & b),
            Opcode::Or => a | b,
            Opcode::Nor => !(a | b),
            _ => a ^ b,
        };
        self.store_result(context, self.integer(value), &target)
    }

    /// DefDivide := DivideOp Dividend Divisor Remainder Quotient
    fn def_divide(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let dividend = self.term_arg_integer(context)?;
        let divisor = self.term_arg_integer(context)?;
        let remainder_target = self.target(context)?;
        let quotient_target = self.target(context)?;
        if divisor == 0 {
            return Err(AmlError::DivideByZero);
        }

        let remainder = self.integer(dividend % divisor);
        self.store(context, remainder, &remainder_target)?;
        self.store_result(context, self.integer(dividend / divisor), &quotient_target)
    }

    fn def_unary(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let operand = self.term_arg_integer(context)?;
        let target = self.target(context)?;
        let value = match opcode {
            Opcode::Not => !operand,
            Opcode::FindSetLeftBit => match operand {
                0 => 0,
                _ => 64 - operand.leading_zeros() as u64,
            },
            Opcode::FindSetRightBit => match operand {
                0 => 0,
                _ => operand.trailing_zeros() as u64 + 1,
            },
            Opcode::FromBCD => convert::from_bcd(operand)?,
            _ => convert::to_bcd(operand),
        };
        self.store_result(context, self.integer(value), &target)
    }

    /// DefIncrement := IncrementOp SuperName
    fn def_increment(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let target = self.super_name(context)?;
        let value = self.read_target(context, &target)?;
        let value = self.convert(value, TypeMask::INTEGER)?;
        let value = value.lock().as_integer()?;
        let value = match opcode {
            Opcode::Increment => value.wrapping_add(1),
            _ => value.wrapping_sub(1),
        };
        self.store_result(context, self.integer(value), &target)
    }

    fn def_logical(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let a = self.term_arg_integer(context)? != 0;
        let result = match opcode {
            Opcode::LNot => !a,
            Opcode::LAnd => {
                let b = self.term_arg_integer(context)? != 0;
                a && b
            }
            _ => {
                let b = self.term_arg_integer(context)? != 0;
                a || b
            }
        };
        Ok(self.boolean(result))
    }

    fn def_comparison(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let a = self.term_arg(context)?;
        let a = self.convert(a, TypeMask::COMPUTATIONAL)?.snapshot();
        let b = self.term_arg(context)?;
        let b = self.convert(b, TypeMask::COMPUTATIONAL)?;
        let ordering = convert::compare(&a, &b.lock(), self.integer_width())?;

        let result = match opcode {
            Opcode::LEqual => ordering == Ordering::Equal,
            Opcode::LNotEqual => ordering != Ordering::Equal,
            Opcode::LLess => ordering == Ordering::Less,
            Opcode::LLessEqual => ordering != Ordering::Greater,
            Opcode::LGreater => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        Ok(self.boolean(result))
    }

    /// DefConcat := ConcatOp Data Data Target
    fn def_concat(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let a = self.term_arg(context)?;
        let a = self.operand_value(a)?.snapshot();
        let b = self.term_arg(context)?;
        let b = self.operand_value(b)?;
        let target = self.target(context)?;
        let result = convert::concat(&a, &b.lock(), self.integer_width())?;
        self.store_result(context, self.wrap(result), &target)
    }

    /// DefConcatRes := ConcatResOp BufData BufData Target
    fn def_concat_res(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let a = self.term_arg(context)?;
        let a = self.convert(a, TypeMask::BUFFER)?.snapshot();
        let b = self.term_arg(context)?;
        let b = self.convert(b, TypeMask::BUFFER)?;
        let target = self.target(context)?;
        let result = convert::concat_resources(a.as_buffer()?, b.lock().as_buffer()?)?;
        self.store_result(context, self.wrap(Object::Buffer(result)), &target)
    }

    /// DefToBuffer := ToBufferOp Operand Target, and likewise for the other explicit conversions.
    fn def_to_computational(&mut self, context: &mut MethodContext, opcode: Opcode) -> Result<ObjectRef, AmlError> {
        let operand = self.term_arg(context)?;
        let operand = self.convert(operand, TypeMask::COMPUTATIONAL)?;
        let target = self.target(context)?;
        let width = self.integer_width();
        let result = {
            let operand = operand.lock();
            match opcode {
                Opcode::ToBuffer => Object::Buffer(convert::to_buffer(&operand, width)?),
                Opcode::ToDecimalString => Object::String(convert::to_decimal_string(&operand)?),
                Opcode::ToHexString => Object::String(convert::to_hex_string(&operand)?),
                _ => Object::Integer(self.mask(convert::to_integer_explicit(&operand, width)?)),
            }
        };
        self.store_result(context, self.wrap(result), &target)
    }

    /// DefToString := ToStringOp TermArg LengthArg Target
    fn def_to_string(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let source = self.term_arg(context)?;
        let source = self.convert(source, TypeMask::BUFFER)?;
        let length = self.term_arg_integer(context)?;
        let target = self.target(context)?;
        let length = if length == self.mask(u64::MAX) { None } else { Some(length as usize) };
        let result = convert::buffer_to_string(source.lock().as_buffer()?, length);
        self.store_result(context, self.wrap(Object::String(result)), &target)
    }

    /// DefMid := MidOp MidObj TermArg TermArg Target
    fn def_mid(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let source = self.term_arg(context)?;
        let source = self.convert(source, TypeMask::STRING | TypeMask::BUFFER)?;
        let index = self.term_arg_integer(context)?;
        let length = self.term_arg_integer(context)?;
        let target = self.target(context)?;

        let result = {
            let source = source.lock();
            let bytes = match &*source {
                Object::String(string) => string.as_bytes(),
                other => other.as_buffer()?,
            };
            let start = usize::try_from(index).unwrap_or(usize::MAX).min(bytes.len());
            let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(bytes.len());
            match &*source {
                Object::String(_) => Object::String(String::from_utf8_lossy(&bytes[start..end]).into_owned()),
                _ => Object::Buffer(bytes[start..end].to_vec()),
            }
        };
        self.store_result(context, self.wrap(result), &target)
    }

    /// DefSizeOf := SizeOfOp SuperName
    fn def_size_of(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let target = self.super_name(context)?;
        let object = self.read_target(context, &target)?;
        let object = self.follow_reference(object)?;
        let size = match &*object.lock() {
            Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => bytes.len(),
            Object::String(string) => string.len(),
            Object::Package(elements) => elements.len(),
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Buffer, got: other.typ() }),
        };
        Ok(self.integer(size as u64))
    }

    /// DefObjectType := ObjectTypeOp <SimpleName | DebugObj | DefRefOf | DefDerefOf | DefIndex>
    fn def_object_type(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let target = self.super_name(context)?;
        let typ = match target {
            Target::Debug => ObjectType::Debug,
            _ => {
                let object = self.resolve_target(context, &target)?;
                self.follow_reference(object)?.typ()
            }
        };
        Ok(self.integer(typ.type_code()))
    }

    /// DefIndex := IndexOp BuffPkgStrObj IndexValue Target
    fn def_index(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let source = self.term_arg(context)?;
        let source = self.follow_reference(source)?;
        let index = self.term_arg_integer(context)?;
        let target = self.target(context)?;

        let length = match &*source.lock() {
            Object::Package(elements) => elements.len(),
            Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => bytes.len(),
            Object::String(string) => string.len(),
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Package, got: other.typ() }),
        };
        let index = usize::try_from(index).map_err(|_| AmlError::IndexOutOfBounds)?;
        if index >= length {
            return Err(AmlError::IndexOutOfBounds);
        }

        let reference = self.wrap(Object::Reference(Reference::Index { target: source, index }));
        self.store_result(context, reference, &target)
    }

    /// DefDerefOf := DerefOfOp ObjReference
    fn def_deref_of(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let operand = self.term_arg(context)?;
        let reference = match &*operand.lock() {
            Object::Reference(reference) => Ok(reference.clone()),
            Object::String(path) => Err(AmlName::from_str(path)?),
            other => {
                return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Reference, got: other.typ() })
            }
        };
        let object = match reference {
            Ok(reference) => self.deref(&reference)?,
            Err(path) => {
                let handle = self.namespace.search(&path, &context.scope)?;
                self.namespace.get(handle)?
            }
        };
        self.read_object(object)
    }

    /// DefCondRefOf := CondRefOfOp SuperName Target
    fn def_cond_ref_of(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let source = self.optional_super_name(context)?;
        let target = self.target(context)?;
        match source {
            Some(source) => {
                let reference = self.reference_to(context, &source)?;
                self.store(context, reference, &target)?;
                Ok(self.boolean(true))
            }
            None => Ok(self.boolean(false)),
        }
    }

    /// DefAcquire := AcquireOp MutexObject Timeout
    fn def_acquire(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let target = self.super_name(context)?;
        let _timeout = context.stream.next_u16()?;
        let mutex = self.resolve_target(context, &target)?;

        let mut mutex = mutex.lock();
        match &mut *mutex {
            Object::Mutex { sync_level, .. } if *sync_level < self.sync_level => {
                Err(AmlError::SyncLevelTooLow { current: self.sync_level, requested: *sync_level })
            }
            Object::Mutex { sync_level, depth } => match depth.checked_add(1) {
                Some(new_depth) => {
                    *depth = new_depth;
                    self.sync_stack.push(self.sync_level);
                    self.sync_level = *sync_level;
                    Ok(self.integer(0))
                }
                // Report a timeout if the mutex can't be acquired any more deeply
                None => Ok(self.boolean(true)),
            },
            other => Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Mutex, got: other.typ() }),
        }
    }

    /// DefWait := WaitOp EventObject Operand
    fn def_wait(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        let target = self.super_name(context)?;
        let _timeout = self.term_arg_integer(context)?;
        let event = self.resolve_target(context, &target)?;

        let mut event = event.lock();
        match &mut *event {
            Object::Event { pending: 0 } => Ok(self.boolean(true)),
            Object::Event { pending } => {
                *pending -= 1;
                Ok(self.integer(0))
            }
            other => Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Event, got: other.typ() }),
        }
    }

    fn boolean(&self, value: bool) -> ObjectRef {
        self.integer(if value { TRUE } else { 0 })
    }

    /// Store `value` to `target` and return it, for operators whose result is both stored and produced.
    fn store_result(
        &mut self,
        context: &MethodContext,
        value: ObjectRef,
        target: &Target,
    ) -> Result<ObjectRef, AmlError> {
        self.store(context, value.share(), target)?;
        Ok(value)
    }

    /// An operand of `Concat`: references are followed and fields read, but the type is left alone.
    fn operand_value(&mut self, operand: ObjectRef) -> Result<ObjectRef, AmlError> {
        let operand = self.follow_reference(operand)?;
        self.read_object(operand)
    }

    fn reference_to(&mut self, context: &MethodContext, target: &Target) -> Result<ObjectRef, AmlError> {
        let reference = match target {
            Target::Local(local) => Reference::Slot(context.locals[*local as usize].downgrade()),
            Target::Arg(arg) => {
                let slot = &context.args[*arg as usize];
                if slot.typ() == ObjectType::Reference {
                    return Ok(slot.share());
                }
                Reference::Slot(slot.downgrade())
            }
            Target::Named(handle) => Reference::Named { handle: *handle, name: self.namespace.path_of(*handle)? },
            Target::Object(object) if object.typ() == ObjectType::Reference => return Ok(object.share()),
            Target::Object(object) => {
                return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Reference, got: object.typ() })
            }
            Target::Null | Target::Debug => return Err(AmlError::InvalidStoreTarget),
        };
        Ok(self.wrap(Object::Reference(reference)))
    }

    /// Store `value` to `target`, applying the implicit conversion rules for stores into named objects.
    pub(crate) fn store(&mut self, context: &MethodContext, value: ObjectRef, target: &Target) -> Result<(), AmlError> {
        match target {
            Target::Null => Ok(()),
            Target::Debug => {
                info!("[AML DEBUG] {}", value);
                Ok(())
            }
            Target::Local(local) => {
                self.overwrite(&context.locals[*local as usize], &value);
                Ok(())
            }
            Target::Arg(arg) => {
                let slot = &context.args[*arg as usize];
                match self.held_reference(slot) {
                    Some(reference) => self.store_through_reference(&reference, value),
                    None => {
                        self.overwrite(slot, &value);
                        Ok(())
                    }
                }
            }
            Target::Named(handle) => {
                let object = self.namespace.get(*handle)?;
                self.store_to_object(&object, value)
            }
            Target::Object(object) => match self.held_reference(object) {
                Some(reference) => self.store_through_reference(&reference, value),
                None => self.store_to_object(object, value),
            },
        }
    }

    fn held_reference(&self, object: &ObjectRef) -> Option<Reference> {
        match &*object.lock() {
            Object::Reference(reference) => Some(reference.clone()),
            _ => None,
        }
    }

    /// Replace the contents of `slot` with a copy of `value`. Anything referring to the slot sees the new value.
    fn overwrite(&self, slot: &ObjectRef, value: &ObjectRef) {
        let copy = value.lock().deep_copy(self.namespace.tracker());
        *slot.lock() = copy;
    }

    fn store_through_reference(&mut self, reference: &Reference, value: ObjectRef) -> Result<(), AmlError> {
        match reference {
            Reference::Named { handle, name } => {
                let object = self.namespace.get(*handle).map_err(|_| AmlError::ObjectDoesNotExist(name.clone()))?;
                self.store_to_object(&object, value)
            }
            Reference::Slot(slot) => {
                let slot = slot.upgrade().ok_or(AmlError::DanglingReference)?;
                self.overwrite(&slot, &value);
                Ok(())
            }
            Reference::Index { target, index } => self.store_to_index(target, *index, value),
        }
    }

    fn store_to_object(&mut self, target: &ObjectRef, value: ObjectRef) -> Result<(), AmlError> {
        enum Store {
            Integer,
            String,
            Buffer(usize),
            Field(FieldUnit),
            BufferField { buffer: ObjectRef, bit_offset: usize, bit_length: usize },
            Replace,
        }

        let store = match &*target.lock() {
            Object::Integer(_) => Store::Integer,
            Object::String(_) => Store::String,
            Object::Buffer(bytes) => Store::Buffer(bytes.len()),
            Object::FieldUnit(field) => Store::Field(field.clone()),
            Object::BufferField { buffer, bit_offset, bit_length } => {
                Store::BufferField { buffer: buffer.share(), bit_offset: *bit_offset, bit_length: *bit_length }
            }
            Object::Uninitialized | Object::Package(_) | Object::Reference(_) | Object::RawDataBuffer(_) => {
                Store::Replace
            }
            _ => return Err(AmlError::InvalidStoreTarget),
        };

        match store {
            Store::Integer => {
                let value = self.convert(value, TypeMask::INTEGER)?;
                let value = value.lock().as_integer()?;
                *target.lock() = Object::Integer(self.mask(value));
            }
            Store::String => {
                let value = self.convert(value, TypeMask::STRING)?;
                let value = String::from(value.lock().as_string()?);
                *target.lock() = Object::String(value);
            }
            Store::Buffer(length) => {
                let value = self.convert(value, TypeMask::BUFFER)?;
                let mut bytes = value.lock().as_buffer()?.to_vec();
                bytes.resize(length, 0);
                *target.lock() = Object::Buffer(bytes);
            }
            Store::Field(field) => {
                let value = self.operand_value(value)?.snapshot();
                self.write_field(&field, &value)?;
            }
            Store::BufferField { buffer, bit_offset, bit_length } => {
                let value = self.operand_value(value)?.snapshot();
                write_buffer_field(&buffer, bit_offset, bit_length, &value)?;
            }
            Store::Replace => self.overwrite(target, &value),
        }
        Ok(())
    }

    fn store_to_index(&mut self, target: &ObjectRef, index: usize, value: ObjectRef) -> Result<(), AmlError> {
        let element = match &*target.lock() {
            Object::Package(elements) => Some(elements.get(index).ok_or(AmlError::IndexOutOfBounds)?.share()),
            Object::Buffer(_) | Object::String(_) => None,
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Package, got: other.typ() }),
        };

        if let Some(element) = element {
            self.overwrite(&element, &value);
            return Ok(());
        }

        let byte = self.convert(value, TypeMask::INTEGER)?;
        let byte = byte.lock().as_integer()? as u8;
        match &mut *target.lock() {
            Object::Buffer(bytes) => *bytes.get_mut(index).ok_or(AmlError::IndexOutOfBounds)? = byte,
            Object::String(string) => {
                let mut bytes = string.as_bytes().to_vec();
                *bytes.get_mut(index).ok_or(AmlError::IndexOutOfBounds)? = byte;
                *string = String::from_utf8(bytes).map_err(|_| AmlError::InvalidConversion)?;
            }
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Buffer, got: other.typ() }),
        }
        Ok(())
    }

    /// `CopyObject` replaces the target outright, without any of the conversions a store does.
    fn copy_object(&mut self, context: &MethodContext, value: &ObjectRef, target: &Target) -> Result<(), AmlError> {
        let slot = match target {
            Target::Local(local) => context.locals[*local as usize].share(),
            Target::Arg(arg) => context.args[*arg as usize].share(),
            Target::Named(handle) => self.namespace.get(*handle)?,
            _ => return Err(AmlError::InvalidStoreTarget),
        };
        self.overwrite(&slot, value);
        Ok(())
    }

    fn def_match(&mut self, context: &mut MethodContext) -> Result<ObjectRef, AmlError> {
        /*
         * DefMatch := MatchOp SearchPkg MatchOpcode Operand MatchOpcode Operand StartIndex
         * MatchOpcode := ByteData // 0 MTR, 1 MEQ, 2 MLE, 3 MLT, 4 MGE, 5 MGT
         */
        let package = self.term_arg(context)?;
        let package = self.follow_reference(package)?;
        let first_op = context.stream.next()?;
        let first = self.term_arg(context)?;
        let first = self.convert(first, TypeMask::COMPUTATIONAL)?.snapshot();
        let second_op = context.stream.next()?;
        let second = self.term_arg(context)?;
        let second = self.convert(second, TypeMask::COMPUTATIONAL)?.snapshot();
        let start = self.term_arg_integer(context)?;

        let elements = match &*package.lock() {
            Object::Package(elements) => elements.clone(),
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Package, got: other.typ() }),
        };

        let start = usize::try_from(start).unwrap_or(usize::MAX);
        for (index, element) in elements.iter().enumerate().skip(start) {
            let element = self.read_object(element.share())?.snapshot();
            if !matches!(element, Object::Integer(_) | Object::String(_) | Object::Buffer(_)) {
                continue;
            }
            if self.match_element(first_op, &element, &first)? && self.match_element(second_op, &element, &second)? {
                return Ok(self.integer(index as u64));
            }
        }
        Ok(self.boolean(true))
    }

    /// Compare a package element against a `Match` operand. Elements that can't be converted to the operand's
    /// type never match.
    fn match_element(&self, op: u8, element: &Object, operand: &Object) -> Result<bool, AmlError> {
        if op == 0 {
            return Ok(true);
        }
        let ordering = match convert::compare(operand, element, self.integer_width()) {
            Ok(ordering) => ordering.reverse(),
            Err(AmlError::InvalidConversion) => return Ok(false),
            Err(err) => return Err(err),
        };

        match op {
            1 => Ok(ordering == Ordering::Equal),
            2 => Ok(ordering != Ordering::Greater),
            3 => Ok(ordering == Ordering::Less),
            4 => Ok(ordering != Ordering::Less),
            5 => Ok(ordering == Ordering::Greater),
            _ => Err(AmlError::InvalidMatchOpcode(op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use alloc::vec;

    #[test]
    fn arithmetic() {
        // Return (Add(5, 7))
        check_ok!(evaluate_body(&[0xa4, 0x72, 0x0a, 0x05, 0x0a, 0x07, 0x00]), Object::Integer(12));
        check_ok!(evaluate_body(&[0xa4, 0x74, 0x0a, 0x05, 0x0a, 0x07, 0x00]), Object::Integer(n) if n == u64::MAX - 1);
        check_ok!(evaluate_body(&[0xa4, 0x77, 0x0a, 0x06, 0x0a, 0x07, 0x00]), Object::Integer(42));
        check_ok!(evaluate_body(&[0xa4, 0x85, 0x0a, 0x11, 0x0a, 0x05, 0x00]), Object::Integer(2));
        check_ok!(evaluate_body(&[0xa4, 0x79, 0x01, 0x0a, 0x04, 0x00]), Object::Integer(16));
        check_ok!(evaluate_body(&[0xa4, 0x79, 0x01, 0x0a, 0x40, 0x00]), Object::Integer(0));
        check_ok!(evaluate_body(&[0xa4, 0x7a, 0x0a, 0x80, 0x0a, 0x03, 0x00]), Object::Integer(16));
        check_ok!(evaluate_body(&[0xa4, 0x7b, 0x0a, 0x0c, 0x0a, 0x0a, 0x00]), Object::Integer(8));
        check_ok!(evaluate_body(&[0xa4, 0x7d, 0x0a, 0x0c, 0x0a, 0x0a, 0x00]), Object::Integer(14));
        check_ok!(evaluate_body(&[0xa4, 0x7f, 0x0a, 0x0c, 0x0a, 0x0a, 0x00]), Object::Integer(6));
        check_ok!(evaluate_body(&[0xa4, 0x80, 0x00, 0x00]), Object::Integer(u64::MAX));
    }

    #[test]
    fn results_are_masked_in_revision_1_tables() {
        let config = crate::Config { dsdt_revision: 1, ..Default::default() };
        // Return (Subtract(0, 1))
        check_ok!(evaluate_body_with(config, &[0xa4, 0x74, 0x00, 0x01, 0x00]), Object::Integer(0xffff_ffff));
    }

    #[test]
    fn divide() {
        // Divide(17, 5, Local0, Local1); Return (Add(Multiply(Local1, 0x10), Local0))
        #[rustfmt::skip]
        let code = [
            0x78, 0x0a, 0x11, 0x0a, 0x05, 0x60, 0x61,
            0xa4, 0x72, 0x77, 0x61, 0x0a, 0x10, 0x00, 0x60, 0x00,
        ];
        check_ok!(evaluate_body(&code), Object::Integer(0x32));
        check_err!(evaluate_body(&[0x78, 0x01, 0x00, 0x00, 0x00]), AmlError::DivideByZero);
        check_err!(evaluate_body(&[0x85, 0x01, 0x00, 0x00]), AmlError::DivideByZero);
    }

    #[test]
    fn bit_searches() {
        check_ok!(evaluate_body(&[0xa4, 0x81, 0x0a, 0x14, 0x00]), Object::Integer(5));
        check_ok!(evaluate_body(&[0xa4, 0x82, 0x0a, 0x14, 0x00]), Object::Integer(3));
        check_ok!(evaluate_body(&[0xa4, 0x81, 0x00, 0x00]), Object::Integer(0));
    }

    #[test]
    fn logical_operators() {
        check_ok!(evaluate_body(&[0xa4, 0x90, 0x01, 0x0a, 0x05]), Object::Integer(u64::MAX));
        check_ok!(evaluate_body(&[0xa4, 0x90, 0x01, 0x00]), Object::Integer(0));
        check_ok!(evaluate_body(&[0xa4, 0x91, 0x00, 0x01]), Object::Integer(u64::MAX));
        check_ok!(evaluate_body(&[0xa4, 0x92, 0x00]), Object::Integer(u64::MAX));
        check_ok!(evaluate_body(&[0xa4, 0x92, 0x93, 0x01, 0x00]), Object::Integer(u64::MAX));
        check_ok!(evaluate_body(&[0xa4, 0x92, 0x94, 0x01, 0x01]), Object::Integer(u64::MAX));
        check_ok!(evaluate_body(&[0xa4, 0x94, 0x01, 0x0a, 0x05]), Object::Integer(0));
        // LEqual("abc", "abc")
        check_ok!(evaluate_body(&[&[0xa4, 0x93][..], b"\x0dabc\0", b"\x0dabc\0"].concat()), Object::Integer(u64::MAX));
    }

    #[test]
    fn concat_integers() {
        // Return (Concat(1, 2))
        let Ok(Object::Buffer(bytes)) = evaluate_body(&[0xa4, 0x73, 0x01, 0x0a, 0x02, 0x00]) else { panic!() };
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[8], 2);
    }

    #[test]
    fn conversions() {
        // ToHexString(0xbe)
        check_ok!(evaluate_body(&[0xa4, 0x98, 0x0a, 0xbe, 0x00]), Object::String(s) if s == "BE");
        // ToInteger("0x1f")
        check_ok!(evaluate_body(&[&[0xa4, 0x99][..], b"\x0d0x1f\0", &[0x00]].concat()), Object::Integer(0x1f));
        // ToDecimalString(123)
        check_ok!(evaluate_body(&[0xa4, 0x97, 0x0a, 0x7b, 0x00]), Object::String(s) if s == "123");
        // ToBuffer("AB")
        check_ok!(
            evaluate_body(&[&[0xa4, 0x96][..], b"\x0dAB\0", &[0x00]].concat()),
            Object::Buffer(b) if b == [b'A', b'B']
        );
        // ToBCD(1234), FromBCD(0x1234)
        check_ok!(evaluate_body(&[0xa4, 0x5b, 0x29, 0x0b, 0xd2, 0x04, 0x00]), Object::Integer(0x1234));
        check_ok!(evaluate_body(&[0xa4, 0x5b, 0x28, 0x0b, 0x34, 0x12, 0x00]), Object::Integer(1234));
        // ToString(Buffer { 'h', 'i', 0, 'x' }, Ones)
        #[rustfmt::skip]
        let code = [&[0xa4, 0x9c, 0x11][..], &pkg(&[0x0a, 0x04, b'h', b'i', 0x00, b'x']), &[0xff, 0x00]].concat();
        check_ok!(evaluate_body(&code), Object::String(s) if s == "hi");
    }

    #[test]
    fn mid() {
        // Mid("Hello", 1, 3)
        check_ok!(
            evaluate_body(&[&[0xa4, 0x9e][..], b"\x0dHello\0", &[0x01, 0x0a, 0x03, 0x00]].concat()),
            Object::String(s) if s == "ell"
        );
        check_ok!(
            evaluate_body(&[&[0xa4, 0x9e][..], b"\x0dHello\0", &[0x0a, 0x09, 0x0a, 0x03, 0x00]].concat()),
            Object::String(s) if s.is_empty()
        );
    }

    #[test]
    fn stores_convert_to_target_type() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("INT_", &[0x0a, 0x00])[..],
            &name("STR_", b"\x0d\0"),
            &name("BUF_", &[&[0x11][..], &pkg(&[0x0a, 0x04])].concat()),
            // Method(MAIN) { Store("1F", INT_); Store(0x2a, STR_); Store(0x0102, BUF_) }
            &method("MAIN", 0, &[
                &[0x70][..], b"\x0d1F\0", b"INT_",
                &[0x70, 0x0a, 0x2a], b"STR_",
                &[0x70, 0x0b, 0x02, 0x01], b"BUF_",
            ].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MAIN"));

        check_ok!(interpreter.evaluate("\\INT_"), Object::Integer(0x1f));
        check_ok!(interpreter.evaluate("\\STR_"), Object::String(s) if s == "000000000000002A");
        check_ok!(interpreter.evaluate("\\BUF_"), Object::Buffer(b) if b == [0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn stores_to_non_data_objects_fail() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &[0x5b, 0x82][..], &pkg(b"DEV0"),
            &method("MAIN", 0, &[&[0x70, 0x01][..], b"DEV0"].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_err!(interpreter.evaluate("\\MAIN"), AmlError::InvalidStoreTarget);
    }

    #[test]
    fn unresolved_targets_are_errors() {
        check_err!(evaluate_body(&[&[0x70, 0x01][..], b"NOPE"].concat()), AmlError::ObjectDoesNotExist(_));
        check_err_kind!(evaluate_body(&[&[0x75][..], b"NOPE"].concat()), crate::ErrorKind::NotFound);
    }

    #[test]
    fn unresolved_operands_are_zero() {
        // Return (Add(NOPE, 3))
        check_ok!(evaluate_body(&[&[0xa4, 0x72][..], b"NOPE", &[0x0a, 0x03, 0x00]].concat()), Object::Integer(3));
    }

    #[test]
    fn index_and_deref() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("PKG_", &[&[0x12][..], &pkg(&[0x03, 0x0a, 0x0a, 0x0a, 0x14, 0x0a, 0x1e])].concat())[..],
            &name("BUF_", &[&[0x11][..], &pkg(&[0x0a, 0x02, 0xaa, 0xbb])].concat()),
            // Method(GET, 1) { Return (DerefOf(Index(PKG_, Arg0))) }
            &method("GET_", 1, &[&[0xa4, 0x83, 0x88][..], b"PKG_", &[0x68, 0x00]].concat()),
            // Method(SET) { Store(0x63, Index(PKG_, 1)); Store(0xcc, Index(BUF_, 0)) }
            &method("SET_", 0, &[
                &[0x70, 0x0a, 0x63, 0x88][..], b"PKG_", &[0x01, 0x00],
                &[0x70, 0x0a, 0xcc, 0x88], b"BUF_", &[0x00, 0x00],
            ].concat()),
            // Method(OOB) { Index(PKG_, 3) }
            &method("OOB_", 0, &[&[0x88][..], b"PKG_", &[0x0a, 0x03, 0x00]].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));

        check_ok!(interpreter.invoke_method(&AmlName::from_str("\\GET_").unwrap(), vec![Object::Integer(2)]), Object::Integer(0x1e));
        check_ok!(interpreter.evaluate("\\SET_"));
        check_ok!(interpreter.invoke_method(&AmlName::from_str("\\GET_").unwrap(), vec![Object::Integer(1)]), Object::Integer(0x63));
        check_ok!(interpreter.evaluate("\\BUF_"), Object::Buffer(b) if b == [0xcc, 0xbb]);
        check_err!(interpreter.evaluate("\\OOB_"), AmlError::IndexOutOfBounds);
    }

    #[test]
    fn references_to_locals_and_names() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("VAL_", &[0x0a, 0x05])[..],
            // Method(INC, 1) { Increment(Arg0) }
            &method("INC_", 1, &[0x75, 0x68]),
            // Method(MAIN) { INC_(RefOf(VAL_)); Local0 = 1; INC_(RefOf(Local0)); Return (Add(VAL_, Local0)) }
            &method("MAIN", 0, &[
                &b"INC_"[..], &[0x71], b"VAL_",
                &[0x70, 0x01, 0x60],
                b"INC_", &[0x71, 0x60],
                &[0xa4, 0x72], b"VAL_", &[0x60, 0x00],
            ].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MAIN"), Object::Integer(8));
        check_ok!(interpreter.evaluate("\\VAL_"), Object::Integer(6));
    }

    #[test]
    fn cond_ref_of() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("VAL_", &[0x0a, 0x05])[..],
            // Method(YES) { Return (CondRefOf(VAL_, Local0)) }
            &method("YES_", 0, &[&[0xa4, 0x5b, 0x12][..], b"VAL_", &[0x60]].concat()),
            // Method(NO) { Return (CondRefOf(NOPE, Local0)) }
            &method("NO__", 0, &[&[0xa4, 0x5b, 0x12][..], b"NOPE", &[0x60]].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\YES_"), Object::Integer(u64::MAX));
        check_ok!(interpreter.evaluate("\\NO__"), Object::Integer(0));
    }

    #[test]
    fn size_of_and_object_type() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("STR_", b"\x0dHello\0")[..],
            &[0x5b, 0x82], &pkg(b"DEV0"),
            &method("SIZE", 0, &[&[0xa4, 0x87][..], b"STR_"].concat()),
            &method("TYPE", 0, &[&[0xa4, 0x8e][..], b"DEV0"].concat()),
            &method("MTYP", 0, &[&[0xa4, 0x8e][..], b"SIZE"].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\SIZE"), Object::Integer(5));
        check_ok!(interpreter.evaluate("\\TYPE"), Object::Integer(6));
        check_ok!(interpreter.evaluate("\\MTYP"), Object::Integer(8));
    }

    #[test]
    fn match_packages() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("PKG_", &[&[0x12][..], &pkg(&[0x04, 0x0a, 0x01, 0x0a, 0x05, 0x0a, 0x0a, 0x0a, 0x05])].concat())[..],
            // Match(PKG_, MGT, 2, MLT, 8, 0)
            &method("MGT_", 0, &[&[0xa4, 0x89][..], b"PKG_", &[0x05, 0x0a, 0x02, 0x03, 0x0a, 0x08, 0x00]].concat()),
            // Match(PKG_, MEQ, 5, MTR, 0, 2)
            &method("MEQ_", 0, &[&[0xa4, 0x89][..], b"PKG_", &[0x01, 0x0a, 0x05, 0x00, 0x00, 0x0a, 0x02]].concat()),
            // Match(PKG_, MEQ, 7, MTR, 0, 0)
            &method("NONE", 0, &[&[0xa4, 0x89][..], b"PKG_", &[0x01, 0x0a, 0x07, 0x00, 0x00, 0x00]].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MGT_"), Object::Integer(1));
        check_ok!(interpreter.evaluate("\\MEQ_"), Object::Integer(3));
        check_ok!(interpreter.evaluate("\\NONE"), Object::Integer(u64::MAX));
    }

    #[test]
    fn copy_object_replaces_type() {
        let interpreter = test_interpreter();
        #[rustfmt::skip]
        let table = [
            &name("INT_", &[0x0a, 0x05])[..],
            // Method(MAIN) { CopyObject("text", INT_) }
            &method("MAIN", 0, &[&[0x9d][..], b"\x0dtext\0", b"INT_"].concat()),
        ]
        .concat();
        check_ok!(interpreter.load_table(&table));
        check_ok!(interpreter.evaluate("\\MAIN"));
        check_ok!(interpreter.evaluate("\\INT_"), Object::String(s) if s == "text");
    }

    #[test]
    fn timer_uses_handler_clock() {
        check_ok!(evaluate_body(&[0xa4, 0x5b, 0x33]), Object::Integer(n) if n == TEST_TIME_NANOS / 100);
    }
}
