//! `Type1Opcode`s: the statements. These never produce a value, but can change the flow of execution.

use crate::{
    method::{Executor, MethodContext},
    name_object::Target,
    namespace::AmlName,
    object::{Object, ObjectType, Reference},
    opcode::Opcode,
    pkg_length::pkg_length,
    term_object::Flow,
    AmlError,
};
use log::{debug, info};

impl Executor<'_> {
    pub(crate) fn statement(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        let opcode = context.stream.opcode()?;
        match opcode {
            Opcode::If => self.def_if_else(context),
            Opcode::Else => {
                // An `Else` that doesn't follow an `If` has nothing to be the alternative of
                let pkg = pkg_length(&mut context.stream)?;
                context.stream.seek(pkg.end_offset)?;
                Ok(Flow::Normal)
            }
            Opcode::While => self.def_while(context),
            Opcode::Break => Ok(Flow::Break),
            Opcode::Continue => Ok(Flow::Continue),
            Opcode::Return => {
                // DefReturn := ReturnOp ArgObject
                let value = self.term_arg(context)?;
                let value = self.read_object(value)?;
                Ok(Flow::Return(value))
            }
            Opcode::Noop => Ok(Flow::Normal),
            Opcode::Breakpoint => {
                debug!("Breakpoint in AML at {:#x} (scope {})", context.stream.pc(), context.scope);
                Ok(Flow::Normal)
            }

            Opcode::Release => {
                // DefRelease := ReleaseOp MutexObject
                let target = self.super_name(context)?;
                self.release(context, &target)?;
                Ok(Flow::Normal)
            }
            Opcode::Signal | Opcode::Reset => {
                // DefSignal := SignalOp EventObject
                let target = self.super_name(context)?;
                let event = self.resolve_target(context, &target)?;
                let mut event = event.lock();
                match &mut *event {
                    Object::Event { pending } if opcode == Opcode::Signal => *pending = pending.saturating_add(1),
                    Object::Event { pending } => *pending = 0,
                    other => {
                        return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Event, got: other.typ() })
                    }
                }
                Ok(Flow::Normal)
            }

            Opcode::Sleep => {
                let milliseconds = self.term_arg_integer(context)?;
                self.handler.sleep(milliseconds);
                Ok(Flow::Normal)
            }
            Opcode::Stall => {
                let microseconds = self.term_arg_integer(context)?;
                self.handler.stall(microseconds);
                Ok(Flow::Normal)
            }

            Opcode::Notify => {
                // DefNotify := NotifyOp NotifyObject NotifyValue
                let target = self.super_name(context)?;
                let value = self.term_arg_integer(context)?;
                let path = self.notify_path(context, &target)?;
                info!("Notify {} with value {:#x}", path, value);
                self.handler.notify(&path, value);
                Ok(Flow::Normal)
            }

            Opcode::Fatal => {
                // DefFatal := FatalOp FatalType FatalCode FatalArg
                let fatal_type = context.stream.next()?;
                let fatal_code = context.stream.next_u32()?;
                let fatal_arg = self.term_arg_integer(context)?;
                self.handler.handle_fatal_error(fatal_type, fatal_code, fatal_arg);
                Err(AmlError::FatalError)
            }

            Opcode::Load | Opcode::Unload => Err(AmlError::Unimplemented),

            other => Err(AmlError::UnexpectedOpcode(other)),
        }
    }

    fn def_if_else(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        /*
         * DefIfElse := IfOp PkgLength Predicate TermList DefElse
         * DefElse := Nothing | <ElseOp PkgLength TermList>
         */
        let if_pkg = pkg_length(&mut context.stream)?;
        let taken = self.in_region(context, if_pkg.end_offset, |this, context| {
            if this.term_arg_integer(context)? != 0 {
                this.term_list(context).map(Some)
            } else {
                Ok(None)
            }
        })?;

        match taken {
            Some(flow) => {
                if context.stream.expect_opcode(Opcode::Else)? {
                    let else_pkg = pkg_length(&mut context.stream)?;
                    context.stream.seek(else_pkg.end_offset)?;
                }
                Ok(flow)
            }
            None => {
                if context.stream.expect_opcode(Opcode::Else)? {
                    let else_pkg = pkg_length(&mut context.stream)?;
                    self.in_region(context, else_pkg.end_offset, |this, context| this.term_list(context))
                } else {
                    Ok(Flow::Normal)
                }
            }
        }
    }

    fn def_while(&mut self, context: &mut MethodContext) -> Result<Flow, AmlError> {
        // DefWhile := WhileOp PkgLength Predicate TermList
        let pkg = pkg_length(&mut context.stream)?;
        let predicate_start = context.stream.pc();

        self.in_region(context, pkg.end_offset, |this, context| loop {
            context.stream.seek(predicate_start)?;
            if this.term_arg_integer(context)? == 0 {
                return Ok(Flow::Normal);
            }

            match this.term_list(context)? {
                Flow::Normal | Flow::Continue => (),
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
            }
        })
    }

    fn release(&mut self, context: &MethodContext, target: &Target) -> Result<(), AmlError> {
        let mutex = self.resolve_target(context, target)?;
        match &mut *mutex.lock() {
            Object::Mutex { depth: 0, .. } => return Err(AmlError::MutexNotAcquired),
            Object::Mutex { depth, .. } => *depth -= 1,
            other => return Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Mutex, got: other.typ() }),
        }

        if let Some(sync_level) = self.sync_stack.pop() {
            self.sync_level = sync_level;
        }
        Ok(())
    }

    fn notify_path(&mut self, context: &MethodContext, target: &Target) -> Result<AmlName, AmlError> {
        match target {
            Target::Named(handle) => self.namespace.path_of(*handle),
            _ => {
                let object = self.resolve_target(context, target)?;
                let reference = match &*object.lock() {
                    Object::Reference(Reference::Named { name, .. }) => Some(name.clone()),
                    _ => None,
                };
                reference.ok_or(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Device, got: object.typ() })
            }
        }
    }
}
