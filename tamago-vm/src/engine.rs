//! Fetch-decode-execute loop
use log::{debug, info, trace};
use std::{collections::BTreeMap, time::Duration};

use crate::{
    clock::{Scheduler, CYCLES_PER_TICK},
    isa::{Opcode, Register},
    memory::{
        Memory, Region, Storage, AUDIO, BUTTONS, DISPLAY_WIDTH, SAVE_DATA,
        SERIAL_PINS, SERIAL_STATE, VIDEO,
    },
    program::{number_to_word, word_to_number, Address, Program},
    save::{SaveRecord, Store},
    value_is_high, HIGH, LOW,
};

/// Display palette for shades 1-3, as `0xRRGGBB`
pub const PALETTE: [u32; 3] = [0xBBC1CB, 0x606E7C, 0x2F3944];

/// Trait for something that presents the framebuffer
pub trait Renderer {
    /// Draws one frame
    ///
    /// `video` holds one byte per pixel, row-major.  Shade 0 is transparent
    /// and shade `n` in `1..=3` is `palette[n - 1]`.
    fn render(&mut self, video: &[u8], palette: &[u32; 3]);
}

/// Run state of the [`Engine`]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum State {
    /// Not executing; time passed to [`Engine::advance`] is ignored
    #[default]
    Stopped,
    /// Executing cycles as time passes
    Running,
}

/// The virtual machine
///
/// Owns memory, storage and the register file; nothing else mutates them.
pub struct Engine {
    memory: Memory,
    storage: Storage,
    registers: [u8; Register::COUNT],

    /// Name of the loaded program, which keys its save data
    name: String,
    /// Jump table of the loaded program
    labels: BTreeMap<u8, Address>,

    state: State,
    scheduler: Scheduler,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Builds a stopped engine with nothing loaded
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            storage: Storage::new(),
            registers: [0; Register::COUNT],
            name: String::new(),
            labels: BTreeMap::new(),
            state: State::Stopped,
            scheduler: Scheduler::new(),
        }
    }

    /// Installs a program image and starts running it
    ///
    /// Registers, memory and storage are cleared first, so nothing leaks
    /// between programs.
    pub fn load_program(&mut self, program: &Program) {
        self.pause();
        self.reset();
        self.storage.clear();
        self.storage.write(0, &program.storage);
        for (i, t) in program.tokens.iter().enumerate() {
            self.storage.write(i * 2, &t.to_bytes());
        }
        self.name.clone_from(&program.name);
        self.labels.clone_from(&program.labels);
        self.scheduler.reset();
        debug!(
            "loaded {:?}: {} tokens, {} labels",
            program.name,
            program.tokens.len(),
            program.labels.len()
        );
        self.run();
    }

    /// Zeroes registers and memory
    ///
    /// Storage (and therefore the loaded program) is left intact.
    pub fn reset(&mut self) {
        self.registers = [0; Register::COUNT];
        self.memory.clear();
    }

    /// Starts running; does nothing if already running
    pub fn run(&mut self) {
        self.state = State::Running;
    }

    /// Stops running
    pub fn pause(&mut self) {
        self.state = State::Stopped;
    }

    /// Returns the current run state
    pub fn state(&self) -> State {
        self.state
    }

    /// Checks whether the engine is running
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Returns the name of the loaded program
    pub fn program_name(&self) -> &str {
        &self.name
    }

    /// Shared borrow of working memory
    #[inline]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable borrow of working memory, used by peripherals
    #[inline]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Shared borrow of program storage
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Borrows the framebuffer
    #[inline]
    pub fn video(&self) -> &[u8] {
        self.memory.region(VIDEO)
    }

    /// Applies the clamp or wrap policy to a value
    ///
    /// Values are clamped to `0..=255`, unless the wrap-values register is
    /// high, in which case they are wrapped modulo 255.
    #[inline]
    fn fit(&self, v: i32) -> u8 {
        if value_is_high(self.register(Register::WrapValues)) {
            v.rem_euclid(255) as u8
        } else {
            v.clamp(0, 255) as u8
        }
    }

    /// Reads a register
    #[inline]
    pub fn register(&self, r: Register) -> u8 {
        self.registers[r as usize]
    }

    /// Reads a register by ordinal, returning 0 for unknown ordinals
    #[inline]
    pub fn register_at(&self, i: u8) -> u8 {
        Register::from_index(i).map(|r| self.register(r)).unwrap_or(0)
    }

    /// Writes a register through the clamp / wrap policy
    #[inline]
    pub fn set_register(&mut self, r: Register, v: i32) {
        self.registers[r as usize] = self.fit(v);
    }

    /// Writes a register by ordinal, ignoring unknown ordinals
    #[inline]
    pub fn set_register_at(&mut self, i: u8, v: i32) {
        if let Some(r) = Register::from_index(i) {
            self.set_register(r, v);
        }
    }

    fn set_pair(&mut self, high: Register, low: Register, a: Address) {
        self.registers[high as usize] = a.high;
        self.registers[low as usize] = a.low;
    }

    fn pair(&self, high: Register, low: Register) -> u16 {
        word_to_number(self.register(high), self.register(low))
    }

    /// Returns the index of the next token to execute
    #[inline]
    pub fn program_counter(&self) -> u16 {
        self.pair(Register::ProgramCounterHigh, Register::ProgramCounterLow)
    }

    /// Moves the program counter to the given token index
    #[inline]
    pub fn set_program_counter(&mut self, pc: u16) {
        self.set_pair(
            Register::ProgramCounterHigh,
            Register::ProgramCounterLow,
            number_to_word(pc),
        );
    }

    fn memory_pointer(&self) -> usize {
        let p =
            self.pair(Register::MemoryPointerHigh, Register::MemoryPointerLow);
        usize::from(p)
    }

    fn storage_pointer(&self) -> usize {
        let p = self
            .pair(Register::StoragePointerHigh, Register::StoragePointerLow);
        usize::from(p)
    }

    fn stack_index(&self) -> u8 {
        self.register(Register::StackIndex)
    }

    fn move_stack_index(&mut self, delta: i32) {
        let si = (i32::from(self.stack_index()) + delta).rem_euclid(256);
        self.registers[Register::StackIndex as usize] = si as u8;
    }

    /// Pushes a value through the clamp / wrap policy
    ///
    /// The stack index is incremented first, then the value is written at the
    /// new index.
    pub fn push(&mut self, v: i32) {
        let v = self.fit(v);
        self.move_stack_index(1);
        let si = self.stack_index();
        self.memory.map_mut().stack[usize::from(si)] = v;
    }

    /// Pops the top of the stack
    pub fn pop(&mut self) -> u8 {
        let v = self.stack_at(0);
        self.move_stack_index(-1);
        v
    }

    /// Reads the stack relative to the stack index
    ///
    /// `0` is the top of the stack, `-1` the value below it, and so on; the
    /// index wraps around the 256-byte stack.
    #[inline]
    pub fn stack_at(&self, rel: i32) -> u8 {
        let i = (i32::from(self.stack_index()) + rel).rem_euclid(256);
        self.memory.map().stack[i as usize]
    }

    fn set_data_buffer(&mut self, v: i32) {
        self.set_register(Register::DataBufferA, v);
    }

    fn data_buffer(&self) -> u8 {
        self.register(Register::DataBufferA)
    }

    /// Runs one cycle, returning the opcode byte at the program counter
    ///
    /// A zero opcode (empty storage) sends the program counter back to the
    /// origin.  While the sleep counter is above zero, cycles only count it
    /// down.
    pub fn run_cycle(&mut self, store: &mut dyn Store) -> u8 {
        let index = self.program_counter();
        let op = self.storage.read_byte(usize::from(index) * 2);

        let sleep = self.register(Register::SleepCounter);
        if sleep > 0 {
            self.set_register(Register::SleepCounter, i32::from(sleep) - 1);
            return op;
        }

        if op == 0 {
            trace!("halted at {index:#06x}");
            self.set_program_counter(0);
            return op;
        }

        // Advance before dispatch, so jumps aren't overwritten
        self.set_program_counter(index.wrapping_add(1));
        let param = self.storage.read_byte(usize::from(index) * 2 + 1);
        self.execute(op, param, store);
        op
    }

    /// Runs one scheduler tick, returning the number of cycles executed
    ///
    /// The timer byte advances unless the timer-paused register is high, then
    /// up to [`CYCLES_PER_TICK`] cycles run; the batch ends early if the CPU
    /// halts.
    pub fn tick(&mut self, store: &mut dyn Store) -> usize {
        if !value_is_high(self.register(Register::TimerPaused)) {
            let t = &mut self.memory.map_mut().timer;
            *t = t.wrapping_add(1);
        }
        for i in 0..CYCLES_PER_TICK {
            if self.run_cycle(store) == 0 {
                return i + 1;
            }
        }
        CYCLES_PER_TICK
    }

    /// Accounts for elapsed wall time, running every tick that is now due
    ///
    /// Returns the number of cycles executed; a stopped engine runs nothing
    /// and does not accumulate time.
    pub fn advance(
        &mut self,
        elapsed: Duration,
        store: &mut dyn Store,
    ) -> usize {
        if !self.is_running() {
            return 0;
        }
        let ticks = self.scheduler.advance(elapsed);
        (0..ticks).map(|_| self.tick(store)).sum()
    }

    /// Runs one host frame: advances time, then renders once
    ///
    /// The renderer only ever sees the state at the end of the frame.
    pub fn frame(
        &mut self,
        elapsed: Duration,
        store: &mut dyn Store,
        renderer: Option<&mut dyn Renderer>,
    ) -> usize {
        if !self.is_running() {
            return 0;
        }
        let n = self.advance(elapsed, store);
        if let Some(r) = renderer {
            r.render(self.video(), &PALETTE);
        }
        n
    }

    fn jump_to_label(&mut self, id: u8) {
        let pc = number_to_word(self.program_counter());
        self.set_pair(
            Register::ReturnPointerHigh,
            Register::ReturnPointerLow,
            pc,
        );
        let target = self.labels.get(&id).copied().unwrap_or_else(|| {
            trace!("jump to missing label {id}");
            Address::default()
        });
        self.set_program_counter(target.into());
    }

    /// Pops `a` then `b`, pushing `f(b, a)`
    fn binary(&mut self, f: impl Fn(i32, i32) -> i32) {
        let a = i32::from(self.pop());
        let b = i32::from(self.pop());
        self.push(f(b, a));
    }

    /// Pops `a` then `b`, jumping to the label if `f(b, a)` holds
    fn branch(&mut self, label: u8, f: impl Fn(u8, u8) -> bool) {
        let a = self.pop();
        let b = self.pop();
        if f(b, a) {
            self.jump_to_label(label);
        }
    }

    fn button(&self, n: u8) -> u8 {
        self.memory.read_region(BUTTONS, usize::from(n))
    }

    fn video_index(x: u8, y: u8) -> usize {
        usize::from(x) % DISPLAY_WIDTH + usize::from(y) * DISPLAY_WIDTH
    }

    fn save(&mut self, store: &mut dyn Store) {
        let mut record = SaveRecord::read(store);
        record.insert(&self.name, self.memory.region(SAVE_DATA));
        record.write(store);
    }

    fn load(&mut self, store: &mut dyn Store) {
        let record = SaveRecord::read(store);
        self.memory.map_mut().save_data.fill(0);
        if let Some(data) = record.get(&self.name) {
            self.memory.write_region(SAVE_DATA, 0, data);
        }
    }

    fn fill(&mut self, r: Region, v: u8) {
        for i in 0..r.len {
            self.memory.write_region(r, i, &[v]);
        }
    }

    fn execute(&mut self, op: u8, param: u8, store: &mut dyn Store) {
        let Some(op) = Opcode::from_u8(op) else {
            return;
        };
        let a = self.stack_at(0);
        let b = self.stack_at(-1);

        match op {
            Opcode::CONST | Opcode::PUSH => self.push(i32::from(param)),
            Opcode::PUSHR => self.push(i32::from(self.register_at(param))),
            Opcode::POP => {
                self.set_data_buffer(i32::from(a));
                self.move_stack_index(-1);
            }
            Opcode::COPY => self.set_data_buffer(i32::from(a)),
            Opcode::INCR => self.move_stack_index(i32::from(param)),
            Opcode::DECR => self.move_stack_index(-i32::from(param)),

            Opcode::ADD => self.binary(|b, a| b + a),
            Opcode::SUB => self.binary(|b, a| b - a),
            Opcode::MUL => self.binary(|b, a| b * a),
            Opcode::DIV => self.binary(|b, a| {
                if a == 0 {
                    255
                } else {
                    (2 * b + a) / (2 * a)
                }
            }),
            Opcode::MOD => {
                self.binary(|b, a| if a == 0 { 0 } else { b % a })
            }
            Opcode::AND => self.binary(|b, a| b & a),
            Opcode::OR => self.binary(|b, a| b | a),
            Opcode::XOR => self.binary(|b, a| b ^ a),
            Opcode::NOT => {
                let a = self.pop();
                self.push(!i32::from(a));
            }
            Opcode::LSHFT => self.binary(|b, a| b.wrapping_shl(a as u32)),
            Opcode::RSHFT => self.binary(|b, a| b.wrapping_shr(a as u32)),

            Opcode::SET => self.set_data_buffer(i32::from(param)),
            Opcode::GET => {
                self.set_data_buffer(i32::from(self.register_at(param)))
            }
            Opcode::MOV => {
                self.set_register_at(param, i32::from(self.data_buffer()))
            }

            Opcode::MADDR => self.set_pair(
                Register::MemoryPointerHigh,
                Register::MemoryPointerLow,
                Address::new(b, a),
            ),
            Opcode::PEEK => {
                let v = self.memory.read_byte(self.memory_pointer());
                self.set_data_buffer(i32::from(v));
            }
            Opcode::POKE => {
                let v = self.data_buffer();
                self.memory.write(self.memory_pointer(), &[v]);
            }

            Opcode::SAVE => self.save(store),
            Opcode::LOAD => self.load(store),

            Opcode::SADDR => self.set_pair(
                Register::StoragePointerHigh,
                Register::StoragePointerLow,
                Address::new(b, a),
            ),
            Opcode::READ => {
                let src = self.storage_pointer();
                if param == 0 {
                    let v = self.storage.read_byte(src);
                    self.set_data_buffer(i32::from(v));
                } else {
                    let dst = self.memory_pointer();
                    let data = self.storage.read(src, usize::from(param));
                    self.memory.write(dst, data);
                }
            }

            Opcode::GOTO => self.set_program_counter(word_to_number(b, a)),
            Opcode::JUMP => self.jump_to_label(param),
            Opcode::RTN => {
                let rp = self.pair(
                    Register::ReturnPointerHigh,
                    Register::ReturnPointerLow,
                );
                self.set_program_counter(rp);
            }
            Opcode::JEQ => self.branch(param, |b, a| b == a),
            Opcode::JNEQ => self.branch(param, |b, a| b != a),
            Opcode::JGT => self.branch(param, |b, a| b > a),
            Opcode::JGTE => self.branch(param, |b, a| b >= a),
            Opcode::JLT => self.branch(param, |b, a| b < a),
            Opcode::JLTE => self.branch(param, |b, a| b <= a),

            Opcode::BTN => {
                let v = if self.button(param) == 1 { HIGH } else { LOW };
                self.set_data_buffer(i32::from(v));
            }
            Opcode::BTND => {
                let v = if matches!(self.button(param), 1 | 2) {
                    HIGH
                } else {
                    LOW
                };
                self.set_data_buffer(i32::from(v));
            }

            Opcode::TICK => {
                self.set_data_buffer(i32::from(self.memory.map().timer))
            }

            Opcode::PIN => {
                let i = usize::from(param);
                let v = self.memory.read_region(SERIAL_PINS, i);
                self.set_data_buffer(i32::from(v));
            }
            Opcode::POUT => {
                let v = self.data_buffer();
                self.memory.write_region(SERIAL_PINS, usize::from(param), &[v]);
            }
            Opcode::SEND => {
                self.memory.write_region(SERIAL_STATE, 0, &[HIGH, LOW])
            }
            Opcode::RECV => {
                let [tx, rx] = self.memory.map().serial_state;
                let v = if !value_is_high(tx) && value_is_high(rx) {
                    HIGH
                } else {
                    LOW
                };
                self.set_data_buffer(i32::from(v));
                self.memory.write_region(SERIAL_STATE, 0, &[LOW, LOW]);
            }

            Opcode::CLEAR => self.fill(VIDEO, param % 4),
            Opcode::DRAW => {
                let i = Self::video_index(b, a);
                self.memory.write_region(VIDEO, i, &[param % 4]);
            }
            Opcode::SHADE => {
                let i = Self::video_index(b, a);
                let v = self.memory.read_region(VIDEO, i);
                self.set_data_buffer(i32::from(v));
            }

            Opcode::TONE => self.memory.write_region(AUDIO, 0, &[b, a]),

            Opcode::SLEEP => {
                self.set_register(Register::SleepCounter, i32::from(param))
            }
            Opcode::LOGR => {
                let name = Register::from_index(param).map(Register::name);
                let v = self.register_at(param);
                info!("register {}: {v}", name.unwrap_or("?"));
            }
            Opcode::LOGS => info!("stack: {a}"),

            // Stubs, reserved for tile / sprite / icon / text assets
            Opcode::TILE
            | Opcode::SPR
            | Opcode::ICON
            | Opcode::PRINT
            | Opcode::RAND
            | Opcode::SIN
            | Opcode::COS
            | Opcode::NOP => (),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        memory::{MEMORY_SIZE, TIMER},
        save::EmptyStore,
    };
    use std::collections::HashMap;

    fn engine(src: &str) -> Engine {
        let mut e = Engine::new();
        e.load_program(&Program::compile("test", src));
        e
    }

    fn step(e: &mut Engine, n: usize) {
        for _ in 0..n {
            e.run_cycle(&mut EmptyStore);
        }
    }

    #[test]
    fn add_two_constants() {
        let mut e = engine("CONST 3\nCONST 4\nADD");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 7);
        assert_eq!(e.register(Register::StackIndex), 1);
    }

    #[test]
    fn backward_jump_loops() {
        let mut e = engine(":LOOP\nCONST 1\nJUMP LOOP");
        for i in 1..=100 {
            step(&mut e, 1);
            let pc = e.program_counter();
            assert!(pc < 3);
            assert_eq!(pc == 0, i % 3 == 0, "cycle {i}");
        }
        // The JUMP saved the address just after itself
        assert_eq!(e.register(Register::ReturnPointerLow), 3);
    }

    #[test]
    fn halt_returns_to_origin() {
        let mut e = engine("PUSH 1");
        assert_eq!(e.run_cycle(&mut EmptyStore), Opcode::PUSH as u8);
        assert_eq!(e.program_counter(), 1);
        assert_eq!(e.run_cycle(&mut EmptyStore), 0);
        assert_eq!(e.program_counter(), 0);
    }

    #[test]
    fn call_and_return() {
        let mut e = engine(
            "PUSH 0\nPUSH 6\nGOTO\n:FN\nPUSH 42\nRTN\nJUMP FN\nPUSH 9",
        );
        step(&mut e, 8);
        assert_eq!(e.stack_at(0), 9);
        assert_eq!(e.stack_at(-1), 42);
        assert_eq!(e.stack_at(-2), 6);
        assert_eq!(e.program_counter(), 8);
    }

    #[test]
    fn comparisons_pop_their_operands() {
        let mut e = engine(":T\nPUSH 2\nPUSH 2\nJEQ T");
        step(&mut e, 4);
        assert_eq!(e.program_counter(), 0);
        assert_eq!(e.register(Register::StackIndex), 0);

        let mut e = engine(":T\nPUSH 1\nPUSH 2\nJEQ T\nPUSH 7");
        step(&mut e, 5);
        assert_eq!(e.program_counter(), 5);
        assert_eq!(e.stack_at(0), 7);

        let mut e = engine(":T\nPUSH 3\nPUSH 2\nJGT T");
        step(&mut e, 4);
        assert_eq!(e.program_counter(), 0);

        let mut e = engine(":T\nPUSH 3\nPUSH 2\nJLTE T");
        step(&mut e, 4);
        assert_eq!(e.program_counter(), 4);
    }

    #[test]
    fn clamp_and_wrap() {
        let mut e = engine("PUSH 200\nPUSH 100\nADD");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 255);

        let mut e = engine("PUSH 1\nPUSH 2\nSUB");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 0);

        let mut e = engine("SET 1\nMOV wv\nPUSH 200\nPUSH 100\nADD");
        step(&mut e, 5);
        assert_eq!(e.stack_at(0), 45);

        let mut e = engine("SET 1\nMOV wv\nPUSH 20\nPUSH 20\nMUL");
        step(&mut e, 5);
        assert_eq!(e.stack_at(0), 145);

        let mut e = engine("SET 1\nMOV wv\nPUSH 1\nPUSH 2\nSUB");
        step(&mut e, 5);
        assert_eq!(e.stack_at(0), 254);
    }

    #[test]
    fn division() {
        let mut e = engine("PUSH 7\nPUSH 2\nDIV");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 4);

        let mut e = engine("PUSH 7\nPUSH 3\nDIV");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 2);

        let mut e = engine("PUSH 7\nPUSH 0\nDIV");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 255);

        let mut e = engine("PUSH 7\nPUSH 0\nMOD");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 0);

        let mut e = engine("PUSH 7\nPUSH 4\nMOD");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 3);
    }

    #[test]
    fn bitwise() {
        let mut e = engine("PUSH 1\nPUSH 4\nLSHFT");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 16);

        let mut e = engine("PUSH 1\nPUSH 9\nLSHFT");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 255);

        let mut e = engine("PUSH 0xf0\nPUSH 4\nRSHFT");
        step(&mut e, 3);
        assert_eq!(e.stack_at(0), 0x0f);

        let mut e = engine("PUSH 0x0c\nPUSH 0x0a\nXOR\nPUSH 3\nAND");
        step(&mut e, 5);
        assert_eq!(e.stack_at(0), 2);

        let mut e = engine("PUSH 0\nNOT");
        step(&mut e, 2);
        assert_eq!(e.stack_at(0), 0);
        assert_eq!(e.register(Register::StackIndex), 1);
    }

    #[test]
    fn stack_wraps() {
        let mut e = Engine::new();
        for i in 0..256 {
            e.push(i);
        }
        for i in (0..256).rev() {
            assert_eq!(e.pop(), i as u8);
        }

        for i in 0..257 {
            e.push(i % 200);
        }
        // The first push landed at index 1, which the 257th overwrote
        assert_eq!(e.register(Register::StackIndex), 1);
        assert_eq!(e.memory().map().stack[1], 56);
        assert_eq!(e.stack_at(-1), 55);
        assert_eq!(e.stack_at(-300), e.stack_at(-44));
    }

    #[test]
    fn stack_index_ops() {
        let mut e = engine("PUSH 5\nPUSH 6\nPOP\nDECR 3\nINCR 1");
        step(&mut e, 3);
        assert_eq!(e.register(Register::DataBufferA), 6);
        assert_eq!(e.register(Register::StackIndex), 1);
        step(&mut e, 1);
        assert_eq!(e.register(Register::StackIndex), 254);
        step(&mut e, 1);
        assert_eq!(e.register(Register::StackIndex), 255);
    }

    #[test]
    fn registers() {
        let mut e = engine("SET 9\nMOV xb\nPUSHR xb\nGET sc\nCOPY");
        step(&mut e, 3);
        assert_eq!(e.register(Register::DataBufferB), 9);
        assert_eq!(e.stack_at(0), 9);
        step(&mut e, 2);
        assert_eq!(e.register(Register::DataBufferA), 9);

        e.set_register_at(200, 5);
        assert_eq!(e.register_at(200), 0);
        e.set_register(Register::DataBufferB, 400);
        assert_eq!(e.register(Register::DataBufferB), 255);
        e.set_register(Register::DataBufferB, -4);
        assert_eq!(e.register(Register::DataBufferB), 0);
    }

    #[test]
    fn sleep_stalls() {
        let mut e = engine("SLEEP 3\nPUSH 1");
        step(&mut e, 4);
        assert_eq!(e.program_counter(), 1);
        assert_eq!(e.register(Register::StackIndex), 0);
        step(&mut e, 1);
        assert_eq!(e.register(Register::StackIndex), 1);
    }

    #[test]
    fn buttons() {
        let mut e = engine("BTN 0\nBTND 1\nBTN 1\nBTN 7");
        e.memory_mut().map_mut().buttons = [1, 2, 0];
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), HIGH);
        e.set_register(Register::DataBufferA, 0);
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), HIGH);
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), LOW);
        e.set_register(Register::DataBufferA, 3);
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), LOW);
    }

    #[test]
    fn clear_and_draw() {
        let mut e = engine("CLEAR 2");
        step(&mut e, 1);
        assert!(e.video().iter().all(|&v| v == 2));

        let mut e = engine("PUSH 5\nPUSH 3\nDRAW 1\nSHADE");
        step(&mut e, 3);
        let target = VIDEO.addr + 5 + 3 * DISPLAY_WIDTH;
        for (i, &v) in e.memory().bytes().iter().enumerate() {
            if i == target {
                assert_eq!(v, 1);
            } else if VIDEO.addr <= i && i < VIDEO.end() {
                assert_eq!(v, 0, "unexpected pixel at {i}");
            }
        }
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), 1);
    }

    #[test]
    fn draw_outside_screen_is_dropped() {
        let mut e = engine("PUSH 40\nPUSH 16\nDRAW 3\nSHADE");
        step(&mut e, 4);
        assert!(e.memory().region(SAVE_DATA).iter().all(|&v| v == 0));
        assert_eq!(e.register(Register::DataBufferA), 0);

        // x wraps around the row
        let mut e = engine("PUSH 33\nPUSH 0\nDRAW 3");
        step(&mut e, 3);
        assert_eq!(e.video()[1], 3);
    }

    #[test]
    fn peek_and_poke() {
        let mut e = engine("PUSH 1\nPUSH 44\nMADDR\nSET 77\nPOKE\nSET 0\nPEEK");
        step(&mut e, 5);
        assert_eq!(e.memory().read_byte(300), 77);
        step(&mut e, 2);
        assert_eq!(e.register(Register::DataBufferA), 77);

        let mut e = engine("PUSH 255\nPUSH 255\nMADDR\nSET 1\nPOKE\nPEEK");
        step(&mut e, 6);
        assert_eq!(e.register(Register::DataBufferA), 0);
        assert_eq!(e.memory().bytes().len(), MEMORY_SIZE);
    }

    #[test]
    fn read_from_storage() {
        let mut p = Program::compile(
            "data",
            "PUSH 2\nPUSH 0\nSADDR\nREAD 0\nPUSH 2\nPUSH 128\nMADDR\nREAD 3",
        );
        p.storage = vec![0; 516];
        p.storage[512..515].copy_from_slice(&[5, 6, 7]);
        let mut e = Engine::new();
        e.load_program(&p);
        step(&mut e, 4);
        assert_eq!(e.register(Register::DataBufferA), 5);
        step(&mut e, 4);
        assert_eq!(&e.video()[..4], &[5, 6, 7, 0]);
    }

    #[test]
    fn tone_and_timer() {
        let mut e = engine("PUSH 1\nPUSH 44\nTONE\nTICK");
        e.memory_mut().map_mut().timer = 12;
        step(&mut e, 4);
        assert_eq!(e.memory().map().audio.get(), 300);
        assert_eq!(e.register(Register::DataBufferA), 12);
    }

    #[test]
    fn serial() {
        let mut e = engine("SET 4\nPOUT 15\nPOUT 16\nSEND\nPIN 15");
        step(&mut e, 3);
        assert_eq!(e.memory().region(SERIAL_PINS)[15], 4);
        assert_eq!(e.memory().read_byte(SERIAL_PINS.end()), 0);
        step(&mut e, 1);
        assert_eq!(e.memory().map().serial_state, [HIGH, LOW]);

        let mut e = engine("RECV\nRECV");
        e.memory_mut().map_mut().serial_state = [LOW, HIGH];
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), HIGH);
        assert_eq!(e.memory().map().serial_state, [LOW, LOW]);
        step(&mut e, 1);
        assert_eq!(e.register(Register::DataBufferA), LOW);
    }

    #[test]
    fn save_and_load() {
        let mut store: HashMap<String, String> = HashMap::new();
        let mut e = Engine::new();
        e.load_program(&Program::compile("pet", "SAVE"));
        let window: Vec<u8> =
            (0..SAVE_DATA.len).map(|i| (i % 250) as u8 + 1).collect();
        e.memory_mut().write_region(SAVE_DATA, 0, &window);
        e.run_cycle(&mut store);

        e.load_program(&Program::compile("pet", "LOAD"));
        assert!(e.memory().region(SAVE_DATA).iter().all(|&v| v == 0));
        e.run_cycle(&mut store);
        assert_eq!(e.memory().region(SAVE_DATA), &window[..]);

        e.load_program(&Program::compile("other", "LOAD"));
        e.memory_mut().write_region(SAVE_DATA, 0, &[9; 16]);
        e.run_cycle(&mut store);
        assert!(e.memory().region(SAVE_DATA).iter().all(|&v| v == 0));
    }

    #[test]
    fn save_keeps_other_programs() {
        let mut store: HashMap<String, String> = HashMap::new();
        let raw = r#"{"other":[7,7,7],"junk":[300]}"#.to_owned();
        Store::set(&mut store, crate::SAVE_RECORD_KEY, raw);

        let mut e = Engine::new();
        e.load_program(&Program::compile("pet", "SAVE"));
        e.run_cycle(&mut store);

        let record = SaveRecord::read(&store);
        assert_eq!(record.get("other"), Some(&[7u8, 7, 7][..]));
        assert_eq!(record.get("pet").map(<[u8]>::len), Some(SAVE_DATA.len));
    }

    #[test]
    fn reset_keeps_storage() {
        let src = "PUSH 1\nPUSH 2\nSET 8\nCLEAR 3";
        let mut e = engine(src);
        step(&mut e, 4);
        assert_eq!(e.register(Register::DataBufferA), 8);

        e.reset();
        assert_eq!(e.state(), State::Running);
        assert!(e.memory().bytes().iter().all(|&v| v == 0));
        for &r in Register::ALL {
            assert_eq!(e.register(r), 0, "register {}", r.name());
        }
        assert_eq!(e.storage()[0], Opcode::PUSH as u8);
        assert_eq!(e.storage()[1], 1);
        assert_eq!(e.storage()[6], Opcode::CLEAR as u8);
        assert_eq!(e.program_name(), "test");

        // Runs again from the origin
        step(&mut e, 4);
        assert_eq!(e.program_counter(), 4);
        assert_eq!(e.stack_at(0), 2);
        assert_eq!(e.register(Register::DataBufferA), 8);
        assert!(e.video().iter().all(|&v| v == 3));

        e.pause();
        e.reset();
        assert_eq!(e.state(), State::Stopped);
    }

    #[test]
    fn addresses_are_not_wrapped() {
        let mut e = engine("PUSH 0\nPUSH 255\nSET 1\nMOV wv\nGOTO");
        step(&mut e, 5);
        assert_eq!(e.register(Register::ProgramCounterLow), 255);
        assert_eq!(e.program_counter(), 255);

        // Values written by the program still wrap
        e.set_register(Register::DataBufferB, 255);
        assert_eq!(e.register(Register::DataBufferB), 0);

        // Token 255 is empty, so the CPU halts back to the origin
        assert_eq!(e.run_cycle(&mut EmptyStore), 0);
        assert_eq!(e.program_counter(), 0);

        let mut e = engine("PUSH 1\nPUSH 255\nSET 1\nMOV wv\nMADDR");
        step(&mut e, 5);
        assert_eq!(e.register(Register::MemoryPointerLow), 255);
        assert_eq!(e.memory_pointer(), 0x1ff);
    }

    #[test]
    fn load_clears_previous_state() {
        let mut e = engine("PUSH 1\nPUSH 2\nSET 8\nCLEAR 3");
        step(&mut e, 4);
        e.pause();
        e.load_program(&Program::compile("next", "NOP"));
        assert!(e.is_running());
        assert!(e.memory().bytes().iter().all(|&v| v == 0));
        assert_eq!(e.register(Register::DataBufferA), 0);
        assert_eq!(e.program_counter(), 0);
        assert_eq!(e.storage()[0], Opcode::NOP as u8);
        assert_eq!(e.storage()[2], 0);
        assert_eq!(e.program_name(), "next");
    }

    #[test]
    fn missing_label_goes_to_origin() {
        let mut p = Program::compile("p", "NOP\nJUMP 5");
        p.labels.clear();
        let mut e = Engine::new();
        e.load_program(&p);
        step(&mut e, 2);
        assert_eq!(e.program_counter(), 0);
    }

    #[test]
    fn advance_runs_whole_ticks() {
        let mut e = engine(":L\nJUMP L");
        assert_eq!(e.advance(Duration::from_millis(20), &mut EmptyStore), 0);
        assert_eq!(
            e.advance(Duration::from_millis(20), &mut EmptyStore),
            CYCLES_PER_TICK
        );
        assert_eq!(e.memory().read_region(TIMER, 0), 1);

        e.set_register(Register::TimerPaused, 1);
        e.advance(Duration::from_millis(50), &mut EmptyStore);
        assert_eq!(e.memory().read_region(TIMER, 0), 1);

        e.pause();
        assert_eq!(e.advance(Duration::from_secs(1), &mut EmptyStore), 0);
        e.run();
        e.run();
        assert!(e.is_running());
        // Leftover time from before the pause still counts
        assert_eq!(
            e.advance(Duration::from_millis(30), &mut EmptyStore),
            CYCLES_PER_TICK
        );
    }

    #[test]
    fn halt_ends_the_tick() {
        let mut e = engine("PUSH 1");
        assert_eq!(e.advance(Duration::from_millis(50), &mut EmptyStore), 2);
        assert_eq!(e.register(Register::StackIndex), 1);
    }

    #[derive(Default)]
    struct CountingRenderer {
        frames: usize,
        last: Vec<u8>,
    }

    impl Renderer for CountingRenderer {
        fn render(&mut self, video: &[u8], palette: &[u32; 3]) {
            assert_eq!(palette, &PALETTE);
            self.frames += 1;
            self.last = video.to_vec();
        }
    }

    #[test]
    fn frame_renders_once() {
        let mut e = engine(":L\nCLEAR 1\nCLEAR 2\nJUMP L");
        let mut r = CountingRenderer::default();
        let dt = Duration::from_millis(180);
        let n = e.frame(dt, &mut EmptyStore, Some(&mut r));
        assert_eq!(n, 5 * CYCLES_PER_TICK);
        assert_eq!(r.frames, 1);
        assert_eq!(r.last.len(), VIDEO.len);

        e.pause();
        e.frame(Duration::from_millis(200), &mut EmptyStore, Some(&mut r));
        assert_eq!(r.frames, 1);
    }
}
