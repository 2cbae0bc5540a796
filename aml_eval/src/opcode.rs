use crate::AmlError;

pub const NULL_NAME: u8 = 0x00;
pub const DUAL_NAME_PREFIX: u8 = 0x2e;
pub const MULTI_NAME_PREFIX: u8 = 0x2f;
pub const ROOT_CHAR: u8 = b'\\';
pub const PREFIX_CHAR: u8 = b'^';

pub const EXT_OP_PREFIX: u8 = 0x5b;
pub const LNOT_OP: u8 = 0x92;

pub const RESERVED_FIELD: u8 = 0x00;
pub const ACCESS_FIELD: u8 = 0x01;
pub const CONNECT_FIELD: u8 = 0x02;
pub const EXTENDED_ACCESS_FIELD: u8 = 0x03;

/// The family an opcode belongs to. The term reader dispatches on this before looking at the opcode
/// itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// `Type1Opcode`s - statements that never produce a value.
    Statement,
    /// `Type2Opcode`s - expressions that produce a value, and may be used as `TermArg`s.
    Expression,
    /// Computational data: constants and the prefixes that introduce literals.
    Data,
    NamedObject,
    NamespaceModifier,
    /// The first byte of a `NameString`. Whether this is a method invocation or a reference to data
    /// can only be decided by looking the name up.
    Name,
    Local,
    Arg,
    Debug,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Zero,
    One,
    Alias,
    Name,
    BytePrefix,
    WordPrefix,
    DWordPrefix,
    StringPrefix,
    QWordPrefix,
    Scope,
    Buffer,
    Package,
    VarPackage,
    Method,
    External,
    DualNamePrefix,
    MultiNamePrefix,
    NameChar(u8),
    Mutex,
    Event,
    CondRefOf,
    CreateField,
    LoadTable,
    Load,
    Stall,
    Sleep,
    Acquire,
    Signal,
    Wait,
    Reset,
    Release,
    FromBCD,
    ToBCD,
    Unload,
    Revision,
    Debug,
    Fatal,
    Timer,
    OpRegion,
    Field,
    Device,
    Processor,
    PowerRes,
    ThermalZone,
    IndexField,
    BankField,
    DataRegion,
    RootChar,
    ParentPrefixChar,
    Local(u8),
    Arg(u8),
    Store,
    RefOf,
    Add,
    Concat,
    Subtract,
    Increment,
    Decrement,
    Multiply,
    Divide,
    ShiftLeft,
    ShiftRight,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Not,
    FindSetLeftBit,
    FindSetRightBit,
    DerefOf,
    ConcatRes,
    Mod,
    Notify,
    SizeOf,
    Index,
    Match,
    CreateDWordField,
    CreateWordField,
    CreateByteField,
    CreateBitField,
    ObjectType,
    CreateQWordField,
    LAnd,
    LOr,
    LNot,
    LNotEqual,
    LLessEqual,
    LGreaterEqual,
    LEqual,
    LGreater,
    LLess,
    ToBuffer,
    ToDecimalString,
    ToHexString,
    ToInteger,
    ToString,
    CopyObject,
    Mid,
    Continue,
    If,
    Else,
    While,
    Noop,
    Return,
    Break,
    Breakpoint,
    Ones,
}

impl Opcode {
    pub fn kind(&self) -> TokenKind {
        use Opcode::*;

        match self {
            Zero | One | Ones | BytePrefix | WordPrefix | DWordPrefix | StringPrefix | QWordPrefix | Revision => {
                TokenKind::Data
            }

            Alias | Name | Scope => TokenKind::NamespaceModifier,

            Method | External | Mutex | Event | CreateField | OpRegion | Field | Device | Processor | PowerRes
            | ThermalZone | IndexField | BankField | DataRegion | CreateDWordField | CreateWordField
            | CreateByteField | CreateBitField | CreateQWordField => TokenKind::NamedObject,

            DualNamePrefix | MultiNamePrefix | NameChar(_) | RootChar | ParentPrefixChar => TokenKind::Name,
            Local(_) => TokenKind::Local,
            Arg(_) => TokenKind::Arg,
            Debug => TokenKind::Debug,

            Stall | Sleep | Signal | Reset | Release | Unload | Fatal | Load | Notify | Continue | If | Else
            | While | Noop | Return | Break | Breakpoint => TokenKind::Statement,

            Buffer | Package | VarPackage | CondRefOf | LoadTable | Acquire | Wait | FromBCD | ToBCD | Timer
            | Store | RefOf | Add | Concat | Subtract | Increment | Decrement | Multiply | Divide | ShiftLeft
            | ShiftRight | And | Nand | Or | Nor | Xor | Not | FindSetLeftBit | FindSetRightBit | DerefOf
            | ConcatRes | Mod | SizeOf | Index | Match | ObjectType | LAnd | LOr | LNot | LNotEqual
            | LLessEqual | LGreaterEqual | LEqual | LGreater | LLess | ToBuffer | ToDecimalString | ToHexString
            | ToInteger | ToString | CopyObject | Mid => TokenKind::Expression,
        }
    }

    /// The name of the opcode as it appears in the ACPI specification's grammar.
    pub fn name(&self) -> &'static str {
        use Opcode::*;

        match self {
            Zero => "ZeroOp",
            One => "OneOp",
            Alias => "AliasOp",
            Name => "NameOp",
            BytePrefix => "BytePrefix",
            WordPrefix => "WordPrefix",
            DWordPrefix => "DWordPrefix",
            StringPrefix => "StringPrefix",
            QWordPrefix => "QWordPrefix",
            Scope => "ScopeOp",
            Buffer => "BufferOp",
            Package => "PackageOp",
            VarPackage => "VarPackageOp",
            Method => "MethodOp",
            External => "ExternalOp",
            DualNamePrefix => "DualNamePrefix",
            MultiNamePrefix => "MultiNamePrefix",
            NameChar(_) => "NameChar",
            Mutex => "MutexOp",
            Event => "EventOp",
            CondRefOf => "CondRefOfOp",
            CreateField => "CreateFieldOp",
            LoadTable => "LoadTableOp",
            Load => "LoadOp",
            Stall => "StallOp",
            Sleep => "SleepOp",
            Acquire => "AcquireOp",
            Signal => "SignalOp",
            Wait => "WaitOp",
            Reset => "ResetOp",
            Release => "ReleaseOp",
            FromBCD => "FromBCDOp",
            ToBCD => "ToBCDOp",
            Unload => "UnloadOp",
            Revision => "RevisionOp",
            Debug => "DebugOp",
            Fatal => "FatalOp",
            Timer => "TimerOp",
            OpRegion => "OpRegionOp",
            Field => "FieldOp",
            Device => "DeviceOp",
            Processor => "ProcessorOp",
            PowerRes => "PowerResOp",
            ThermalZone => "ThermalZoneOp",
            IndexField => "IndexFieldOp",
            BankField => "BankFieldOp",
            DataRegion => "DataRegionOp",
            RootChar => "RootChar",
            ParentPrefixChar => "ParentPrefixChar",
            Local(_) => "LocalObj",
            Arg(_) => "ArgObj",
            Store => "StoreOp",
            RefOf => "RefOfOp",
            Add => "AddOp",
            Concat => "ConcatOp",
            Subtract => "SubtractOp",
            Increment => "IncrementOp",
            Decrement => "DecrementOp",
            Multiply => "MultiplyOp",
            Divide => "DivideOp",
            ShiftLeft => "ShiftLeftOp",
            ShiftRight => "ShiftRightOp",
            And => "AndOp",
            Nand => "NandOp",
            Or => "OrOp",
            Nor => "NorOp",
            Xor => "XorOp",
            Not => "NotOp",
            FindSetLeftBit => "FindSetLeftBitOp",
            FindSetRightBit => "FindSetRightBitOp",
            DerefOf => "DerefOfOp",
            ConcatRes => "ConcatResOp",
            Mod => "ModOp",
            Notify => "NotifyOp",
            SizeOf => "SizeOfOp",
            Index => "IndexOp",
            Match => "MatchOp",
            CreateDWordField => "CreateDWordFieldOp",
            CreateWordField => "CreateWordFieldOp",
            CreateByteField => "CreateByteFieldOp",
            CreateBitField => "CreateBitFieldOp",
            ObjectType => "ObjectTypeOp",
            CreateQWordField => "CreateQWordFieldOp",
            LAnd => "LAndOp",
            LOr => "LOrOp",
            LNot => "LNotOp",
            LNotEqual => "LNotEqualOp",
            LLessEqual => "LLessEqualOp",
            LGreaterEqual => "LGreaterEqualOp",
            LEqual => "LEqualOp",
            LGreater => "LGreaterOp",
            LLess => "LLessOp",
            ToBuffer => "ToBufferOp",
            ToDecimalString => "ToDecimalStringOp",
            ToHexString => "ToHexStringOp",
            ToInteger => "ToIntegerOp",
            ToString => "ToStringOp",
            CopyObject => "CopyObjectOp",
            Mid => "MidOp",
            Continue => "ContinueOp",
            If => "IfOp",
            Else => "ElseOp",
            While => "WhileOp",
            Noop => "NoopOp",
            Return => "ReturnOp",
            Break => "BreakOp",
            Breakpoint => "BreakPointOp",
            Ones => "OnesOp",
        }
    }
}

/// Decode the opcode at the start of `bytes`, returning it along with the number of bytes it is encoded in.
/// Nothing is consumed - the caller decides whether to advance past it.
pub fn decode(bytes: &[u8]) -> Result<(Opcode, usize), AmlError> {
    let first = *bytes.first().ok_or(AmlError::RunOutOfStream)?;

    if first == EXT_OP_PREFIX {
        let ext = *bytes.get(1).ok_or(AmlError::RunOutOfStream)?;
        let opcode = match ext {
            0x01 => Opcode::Mutex,
            0x02 => Opcode::Event,
            0x12 => Opcode::CondRefOf,
            0x13 => Opcode::CreateField,
            0x1f => Opcode::LoadTable,
            0x20 => Opcode::Load,
            0x21 => Opcode::Stall,
            0x22 => Opcode::Sleep,
            0x23 => Opcode::Acquire,
            0x24 => Opcode::Signal,
            0x25 => Opcode::Wait,
            0x26 => Opcode::Reset,
            0x27 => Opcode::Release,
            0x28 => Opcode::FromBCD,
            0x29 => Opcode::ToBCD,
            0x2a => Opcode::Unload,
            0x30 => Opcode::Revision,
            0x31 => Opcode::Debug,
            0x32 => Opcode::Fatal,
            0x33 => Opcode::Timer,
            0x80 => Opcode::OpRegion,
            0x81 => Opcode::Field,
            0x82 => Opcode::Device,
            0x83 => Opcode::Processor,
            0x84 => Opcode::PowerRes,
            0x85 => Opcode::ThermalZone,
            0x86 => Opcode::IndexField,
            0x87 => Opcode::BankField,
            0x88 => Opcode::DataRegion,
            _ => return Err(AmlError::IllegalOpcode(u16::from_be_bytes([first, ext]))),
        };
        return Ok((opcode, 2));
    }

    let opcode = match first {
        0x00 => Opcode::Zero,
        0x01 => Opcode::One,
        0x06 => Opcode::Alias,
        0x08 => Opcode::Name,
        0x0a => Opcode::BytePrefix,
        0x0b => Opcode::WordPrefix,
        0x0c => Opcode::DWordPrefix,
        0x0d => Opcode::StringPrefix,
        0x0e => Opcode::QWordPrefix,
        0x10 => Opcode::Scope,
        0x11 => Opcode::Buffer,
        0x12 => Opcode::Package,
        0x13 => Opcode::VarPackage,
        0x14 => Opcode::Method,
        0x15 => Opcode::External,
        0x2e => Opcode::DualNamePrefix,
        0x2f => Opcode::MultiNamePrefix,
        0x41..=0x5a => Opcode::NameChar(first), // b'A'..=b'Z'
        0x5c => Opcode::RootChar,
        0x5e => Opcode::ParentPrefixChar,
        0x5f => Opcode::NameChar(b'_'),
        0x60..=0x67 => Opcode::Local(first - 0x60),
        0x68..=0x6e => Opcode::Arg(first - 0x68),
        0x70 => Opcode::Store,
        0x71 => Opcode::RefOf,
        0x72 => Opcode::Add,
        0x73 => Opcode::Concat,
        0x74 => Opcode::Subtract,
        0x75 => Opcode::Increment,
        0x76 => Opcode::Decrement,
        0x77 => Opcode::Multiply,
        0x78 => Opcode::Divide,
        0x79 => Opcode::ShiftLeft,
        0x7a => Opcode::ShiftRight,
        0x7b => Opcode::And,
        0x7c => Opcode::Nand,
        0x7d => Opcode::Or,
        0x7e => Opcode::Nor,
        0x7f => Opcode::Xor,
        0x80 => Opcode::Not,
        0x81 => Opcode::FindSetLeftBit,
        0x82 => Opcode::FindSetRightBit,
        0x83 => Opcode::DerefOf,
        0x84 => Opcode::ConcatRes,
        0x85 => Opcode::Mod,
        0x86 => Opcode::Notify,
        0x87 => Opcode::SizeOf,
        0x88 => Opcode::Index,
        0x89 => Opcode::Match,
        0x8a => Opcode::CreateDWordField,
        0x8b => Opcode::CreateWordField,
        0x8c => Opcode::CreateByteField,
        0x8d => Opcode::CreateBitField,
        0x8e => Opcode::ObjectType,
        0x8f => Opcode::CreateQWordField,
        0x90 => Opcode::LAnd,
        0x91 => Opcode::LOr,
        /*
         * `0x92` is a bit strange. It can be an opcode in its own right (`LNotOp`), but when
         * followed by `0x93..=0x95`, it instead serves as a negating prefix to encode
         * `LNotEqualOp`, `LLessEqualOp`, and `LGreaterEqualOp`.
         */
        LNOT_OP => {
            return Ok(match bytes.get(1) {
                Some(0x93) => (Opcode::LNotEqual, 2),
                Some(0x94) => (Opcode::LLessEqual, 2),
                Some(0x95) => (Opcode::LGreaterEqual, 2),
                _ => (Opcode::LNot, 1),
            })
        }
        0x93 => Opcode::LEqual,
        0x94 => Opcode::LGreater,
        0x95 => Opcode::LLess,
        0x96 => Opcode::ToBuffer,
        0x97 => Opcode::ToDecimalString,
        0x98 => Opcode::ToHexString,
        0x99 => Opcode::ToInteger,
        0x9c => Opcode::ToString,
        0x9d => Opcode::CopyObject,
        0x9e => Opcode::Mid,
        0x9f => Opcode::Continue,
        0xa0 => Opcode::If,
        0xa1 => Opcode::Else,
        0xa2 => Opcode::While,
        0xa3 => Opcode::Noop,
        0xa4 => Opcode::Return,
        0xa5 => Opcode::Break,
        0xcc => Opcode::Breakpoint,
        0xff => Opcode::Ones,

        _ => return Err(AmlError::IllegalOpcode(first as u16)),
    };

    Ok((opcode, 1))
}
