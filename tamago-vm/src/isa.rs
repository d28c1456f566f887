//! Instruction set and register file
//!
//! Stack notation in the opcode docs lists the top of the stack last, so
//! `( b a -- c )` pops `a` then `b` and pushes `c`.  Operations which only
//! _read_ their operands leave the stack untouched and say so.

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $v:literal),* $(,)?) => {
        /// A single VM operation
        ///
        /// Opcode `0` is never assigned: an empty storage cell halts the CPU
        /// and sends it back to the origin.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$meta])* $name = $v),*
        }

        impl Opcode {
            /// Every opcode, in ordinal order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            /// Decodes an opcode byte, returning `None` for unassigned values
            #[inline]
            pub fn from_u8(v: u8) -> Option<Self> {
                match v {
                    $($v => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Returns the assembler mnemonic
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    /// `CONST v ( -- v )`: pushes the literal parameter
    CONST = 1,
    /// `PUSH v ( -- v )`: pushes the literal parameter
    PUSH = 2,
    /// `PUSHR r ( -- reg[r] )`: pushes the value of register `r`
    PUSHR = 3,
    /// `POP ( a -- )`: copies `a` to `xa` and drops it
    POP = 4,
    /// `COPY`: copies the top of the stack to `xa`
    COPY = 5,
    /// `INCR n`: moves the stack index up by `n`
    INCR = 6,
    /// `DECR n`: moves the stack index down by `n`
    DECR = 7,

    /// `ADD ( b a -- b+a )`
    ADD = 8,
    /// `SUB ( b a -- b-a )`
    SUB = 9,
    /// `MUL ( b a -- b*a )`
    MUL = 10,
    /// `DIV ( b a -- b/a )`, rounded half up; division by zero gives 255
    DIV = 11,
    /// `MOD ( b a -- b%a )`; modulo zero gives 0
    MOD = 12,
    /// Reserved, does nothing
    RAND = 13,
    /// Reserved, does nothing
    SIN = 14,
    /// Reserved, does nothing
    COS = 15,

    /// `AND ( b a -- b&a )`
    AND = 16,
    /// `OR ( b a -- b|a )`
    OR = 17,
    /// `XOR ( b a -- b^a )`
    XOR = 18,
    /// `NOT ( a -- !a )`
    NOT = 19,
    /// `LSHFT ( b a -- b<<a )`
    LSHFT = 20,
    /// `RSHFT ( b a -- b>>a )`
    RSHFT = 21,

    /// `SET v`: copies the literal parameter to `xa`
    SET = 22,
    /// `GET r`: copies register `r` to `xa`
    GET = 23,
    /// `MOV r`: copies `xa` to register `r`
    MOV = 24,

    /// `MADDR`: sets the memory pointer to `(b, a)`; the stack is only read
    MADDR = 25,
    /// `PEEK`: copies the byte at the memory pointer to `xa`
    PEEK = 26,
    /// `POKE`: copies `xa` to the byte at the memory pointer
    POKE = 27,

    /// `SAVE`: persists the save-data window under the program's name
    SAVE = 28,
    /// `LOAD`: restores the save-data window for the program's name
    LOAD = 29,

    /// `SADDR`: sets the storage pointer to `(b, a)`; the stack is only read
    SADDR = 30,
    /// `READ n`: with `n == 0`, copies the byte at the storage pointer to
    /// `xa`; otherwise copies `n` bytes from the storage pointer to the
    /// memory pointer
    READ = 31,

    /// `GOTO`: sets the program counter to `(b, a)`; the stack is only read
    GOTO = 32,
    /// `JUMP label`: saves the program counter in the return pointer, then
    /// moves to the label
    JUMP = 33,
    /// `RTN`: moves the program counter to the return pointer
    RTN = 34,
    /// `JEQ label ( b a -- )`: jumps if `b == a`
    JEQ = 35,
    /// `JNEQ label ( b a -- )`: jumps if `b != a`
    JNEQ = 36,
    /// `JGT label ( b a -- )`: jumps if `b > a`
    JGT = 37,
    /// `JGTE label ( b a -- )`: jumps if `b >= a`
    JGTE = 38,
    /// `JLT label ( b a -- )`: jumps if `b < a`
    JLT = 39,
    /// `JLTE label ( b a -- )`: jumps if `b <= a`
    JLTE = 40,

    /// `BTN n`: `xa` is HIGH if button `n` was just pressed
    BTN = 41,
    /// `BTND n`: `xa` is HIGH if button `n` is down
    BTND = 42,

    /// `TICK`: copies the timer tick to `xa`
    TICK = 43,

    /// `PIN n`: copies serial pin `n` to `xa`
    PIN = 44,
    /// `POUT n`: copies `xa` to serial pin `n`
    POUT = 45,
    /// `SEND`: marks the serial port as sending
    SEND = 46,
    /// `RECV`: `xa` is HIGH if something was received; clears the state
    RECV = 47,

    /// `CLEAR s`: fills video memory with shade `s`
    CLEAR = 48,
    /// `DRAW s`: sets the pixel at `(x = b, y = a)` to shade `s`
    DRAW = 49,
    /// `SHADE`: copies the shade at `(x = b, y = a)` to `xa`
    SHADE = 50,
    /// Reserved for tile drawing, does nothing
    TILE = 51,
    /// Reserved for sprite drawing, does nothing
    SPR = 52,
    /// Reserved for icon selection, does nothing
    ICON = 53,
    /// Reserved for character drawing, does nothing
    PRINT = 54,

    /// `TONE`: copies `(b, a)` to the audio frequency (0 is silent)
    TONE = 55,

    /// `SLEEP n`: stalls for `n` cycles
    SLEEP = 56,
    /// `LOGR r`: logs register `r`
    LOGR = 57,
    /// `LOGS`: logs the top of the stack
    LOGS = 58,
    /// Does nothing
    NOP = 59,
}

impl Opcode {
    /// Looks up an opcode by mnemonic, ignoring case
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(s))
    }

    /// Checks whether the parameter of this opcode names a label
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::JUMP
                | Opcode::JEQ
                | Opcode::JNEQ
                | Opcode::JGT
                | Opcode::JGTE
                | Opcode::JLT
                | Opcode::JLTE
        )
    }
}

macro_rules! registers {
    ($($(#[$meta:meta])* $name:ident = $sym:literal),* $(,)?) => {
        /// Named single-byte CPU register
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Register {
            $($(#[$meta])* $name),*
        }

        impl Register {
            /// Every register, in ordinal order
            pub const ALL: &'static [Register] = &[$(Register::$name),*];

            /// Returns the symbol used for this register in source text
            pub fn name(self) -> &'static str {
                match self {
                    $(Register::$name => $sym,)*
                }
            }
        }
    };
}

registers! {
    /// Data buffer A, the target of most loads
    DataBufferA = "xa",
    /// Data buffer B
    DataBufferB = "xb",
    /// Program counter, high byte
    ProgramCounterHigh = "pch",
    /// Program counter, low byte
    ProgramCounterLow = "pcl",
    /// Stack index
    StackIndex = "si",
    /// Memory pointer, high byte
    MemoryPointerHigh = "mph",
    /// Memory pointer, low byte
    MemoryPointerLow = "mpl",
    /// Storage pointer, high byte
    StoragePointerHigh = "sph",
    /// Storage pointer, low byte
    StoragePointerLow = "spl",
    /// Return pointer, high byte
    ReturnPointerHigh = "rph",
    /// Return pointer, low byte
    ReturnPointerLow = "rpl",
    /// Remaining stall cycles
    SleepCounter = "sc",
    /// Stops the timer tick from advancing when high
    TimerPaused = "tp",
    /// Reserved for drawing tiles from memory
    DrawFromMemory = "dm",
    /// Wrap arithmetic results instead of clamping them when high
    WrapValues = "wv",
}

impl Register {
    /// Size of the register file
    pub const COUNT: usize = Self::ALL.len();

    /// Looks up a register by ordinal
    #[inline]
    pub fn from_index(i: u8) -> Option<Self> {
        Self::ALL.get(usize::from(i)).copied()
    }

    /// Looks up a register by symbol, ignoring case
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(s))
    }
}
