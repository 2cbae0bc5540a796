use crate::{
    method::{Executor, MethodContext},
    namespace::{AmlHandle, AmlName, NameComponent, NameSeg},
    object::{Object, ObjectRef, Reference},
    opcode::{Opcode, TokenKind, DUAL_NAME_PREFIX, MULTI_NAME_PREFIX, NULL_NAME, PREFIX_CHAR, ROOT_CHAR},
    stream::AmlStream,
    AmlError,
};
use alloc::vec::Vec;

/// A location that the result of an operation can be stored to. Produced by reading a `Target`, `SimpleName`
/// or `SuperName`.
#[derive(Clone, Debug)]
pub(crate) enum Target {
    Null,
    Debug,
    Local(u8),
    Arg(u8),
    Named(AmlHandle),
    /// The result of a `ReferenceTypeOpcode` (`RefOf`, `DerefOf` or `Index`).
    Object(ObjectRef),
}

/// Read a `NameString` from the stream.
pub fn read_name_string(stream: &mut AmlStream) -> Result<AmlName, AmlError> {
    /*
     * NameString := <RootChar('\') NamePath> | <PrefixPath NamePath>
     * PrefixPath := Nothing | <'^' PrefixPath>
     * NamePath := NameSeg | DualNamePath | MultiNamePath | NullName
     */
    let mut components = Vec::new();
    match stream.peek()? {
        ROOT_CHAR => {
            stream.next()?;
            components.push(NameComponent::Root);
        }
        PREFIX_CHAR => {
            while stream.peek()? == PREFIX_CHAR {
                stream.next()?;
                components.push(NameComponent::Prefix);
            }
        }
        _ => (),
    }

    match stream.next()? {
        NULL_NAME => (),
        DUAL_NAME_PREFIX => {
            for _ in 0..2 {
                components.push(NameComponent::Segment(name_seg(stream)?));
            }
        }
        MULTI_NAME_PREFIX => {
            let seg_count = stream.next()?;
            for _ in 0..seg_count {
                components.push(NameComponent::Segment(name_seg(stream)?));
            }
        }
        first => {
            let rest = stream.take(3)?;
            components.push(NameComponent::Segment(NameSeg::from_bytes([first, rest[0], rest[1], rest[2]])?));
        }
    }

    Ok(AmlName::from_components(components))
}

pub fn name_seg(stream: &mut AmlStream) -> Result<NameSeg, AmlError> {
    let bytes = stream.take(4)?;
    NameSeg::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl Executor<'_> {
    /// Target := SuperName | NullName
    pub(crate) fn target(&mut self, context: &mut MethodContext) -> Result<Target, AmlError> {
        if context.stream.peek()? == NULL_NAME {
            context.stream.next()?;
            return Ok(Target::Null);
        }
        self.super_name(context)
    }

    /// SuperName := SimpleName | DebugObj | ReferenceTypeOpcode
    ///
    /// Names must resolve: an unresolved name is `ObjectDoesNotExist`.
    pub(crate) fn super_name(&mut self, context: &mut MethodContext) -> Result<Target, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        match opcode {
            Opcode::Debug => {
                context.stream.opcode()?;
                Ok(Target::Debug)
            }
            Opcode::RefOf | Opcode::DerefOf | Opcode::Index => Ok(Target::Object(self.term_arg(context)?)),
            _ => self.simple_name(context),
        }
    }

    /// SimpleName := NameString | ArgObj | LocalObj
    pub(crate) fn simple_name(&mut self, context: &mut MethodContext) -> Result<Target, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        match opcode {
            Opcode::Local(local) => {
                context.stream.opcode()?;
                Ok(Target::Local(local))
            }
            Opcode::Arg(arg) => {
                context.stream.opcode()?;
                Ok(Target::Arg(arg))
            }
            _ if opcode.kind() == TokenKind::Name => {
                let name = read_name_string(&mut context.stream)?;
                Ok(Target::Named(self.namespace.search(&name, &context.scope)?))
            }
            other => Err(AmlError::UnexpectedOpcode(other)),
        }
    }

    /// Like [`Executor::super_name`], but an unresolved name gives `None` rather than an error. Used by
    /// `CondRefOf`.
    pub(crate) fn optional_super_name(&mut self, context: &mut MethodContext) -> Result<Option<Target>, AmlError> {
        let (opcode, _) = context.stream.peek_opcode()?;
        if opcode.kind() != TokenKind::Name {
            return self.super_name(context).map(Some);
        }

        let name = read_name_string(&mut context.stream)?;
        match self.namespace.search(&name, &context.scope) {
            Ok(handle) if self.namespace.get(handle)?.typ() != crate::ObjectType::Uninitialized => {
                Ok(Some(Target::Named(handle)))
            }
            Ok(_) | Err(AmlError::ObjectDoesNotExist(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// The object a target designates. References held by arguments, and those produced by reference-type
    /// opcodes, are followed; field units are not read.
    pub(crate) fn resolve_target(&mut self, context: &MethodContext, target: &Target) -> Result<ObjectRef, AmlError> {
        match target {
            Target::Null | Target::Debug => Err(AmlError::InvalidStoreTarget),
            Target::Local(local) => Ok(context.locals[*local as usize].share()),
            Target::Arg(arg) => self.follow_reference(context.args[*arg as usize].share()),
            Target::Named(handle) => self.namespace.get(*handle),
            Target::Object(object) => self.follow_reference(object.share()),
        }
    }

    /// The current value of a target, with field units read.
    pub(crate) fn read_target(&mut self, context: &MethodContext, target: &Target) -> Result<ObjectRef, AmlError> {
        let object = self.resolve_target(context, target)?;
        self.read_object(object)
    }

    /// If `object` is a reference, get the object it refers to. Otherwise, return it unchanged.
    pub(crate) fn follow_reference(&mut self, object: ObjectRef) -> Result<ObjectRef, AmlError> {
        let reference = match &*object.lock() {
            Object::Reference(reference) => reference.clone(),
            _ => return Ok(object.share()),
        };
        self.deref(&reference)
    }

    pub(crate) fn deref(&mut self, reference: &Reference) -> Result<ObjectRef, AmlError> {
        match reference {
            Reference::Named { handle, name } => {
                self.namespace.get(*handle).map_err(|_| AmlError::ObjectDoesNotExist(name.clone()))
            }
            Reference::Slot(slot) => slot.upgrade().ok_or(AmlError::DanglingReference),
            Reference::Index { target, index } => {
                let element = match &*target.lock() {
                    Object::Package(elements) => {
                        return elements.get(*index).map(ObjectRef::share).ok_or(AmlError::IndexOutOfBounds)
                    }
                    Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => bytes.get(*index).copied(),
                    Object::String(string) => string.as_bytes().get(*index).copied(),
                    other => {
                        return Err(AmlError::ObjectNotOfExpectedType {
                            expected: crate::ObjectType::Package,
                            got: other.typ(),
                        })
                    }
                };
                let byte = element.ok_or(AmlError::IndexOutOfBounds)?;
                Ok(self.wrap(Object::Integer(byte as u64)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn parse(bytes: &[u8]) -> Result<(AmlName, usize), AmlError> {
        let mut stream = AmlStream::new(bytes);
        let name = read_name_string(&mut stream)?;
        Ok((name, stream.pc()))
    }

    #[test]
    fn single_segments() {
        let (name, length) = parse(b"FOO_\x0a").unwrap();
        assert_eq!(name.to_string(), "FOO_");
        assert_eq!(length, 4);
        assert_eq!(parse(b"1FOO"), Err(AmlError::InvalidNameSeg));
        assert_eq!(parse(b"FO"), Err(AmlError::RunOutOfStream));
    }

    #[test]
    fn root_and_prefixed_names() {
        assert_eq!(parse(b"\\_SB_").map(|(name, _)| name.to_string()), Ok("\\_SB_".to_string()));
        assert_eq!(parse(b"^^FOO_").map(|(name, _)| name.to_string()), Ok("^^FOO_".to_string()));
        assert_eq!(parse(b"\\\x00").map(|(name, _)| name.to_string()), Ok("\\".to_string()));
    }

    #[test]
    fn dual_and_multi_names() {
        let (name, length) = parse(b"\x2e_SB_PCI0").unwrap();
        assert_eq!(name.to_string(), "_SB_.PCI0");
        assert_eq!(length, 9);

        let (name, length) = parse(b"\\\x2f\x03_SB_PCI0LPCB").unwrap();
        assert_eq!(name.to_string(), "\\_SB_.PCI0.LPCB");
        assert_eq!(length, 15);

        assert_eq!(parse(b"\x2f\x03_SB_PCI0"), Err(AmlError::RunOutOfStream));
    }

    #[test]
    fn null_name() {
        let (name, length) = parse(b"\x00").unwrap();
        assert!(name.is_null());
        assert_eq!(length, 1);

        let (name, _) = parse(b"^\x00").unwrap();
        assert_eq!(name.resolve(&AmlName::from_str("\\_SB.PCI0").unwrap()).unwrap().to_string(), "\\_SB_");
    }
}
