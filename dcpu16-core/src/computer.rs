//! The execution engine: fetch/decode/dispatch, the ALU, conditional-skip
//! chaining, and the interrupt queue that ties the CPU to attached devices.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::addressing::{load, pop, push, store};
use crate::decode::{decode, AddressingMode, Instruction, Opcode, SpecialOpcode};
use crate::error::Error;
use crate::interrupt::{Cpu, Device, DeviceContext, DeviceInfo, InterruptChannel};
use crate::memory::Memory;
use crate::registers::Registers;
use crate::{DoubleWord, SignedWord, Word};

struct AttachedDevice {
    info: DeviceInfo,
    channel: Arc<InterruptChannel>,
    handle: Option<JoinHandle<()>>,
}

/// A DCPU-16 machine: processor state, the attached devices, and the
/// interrupt queue between them.
///
/// Devices are registered by index at [`attach`](Self::attach) time and
/// looked up by that index from `HWQ`/`HWI` — there's no back-reference from
/// a device to the `Computer`, only to the [`Cpu`] handle it needs to do its
/// work during its turn.
pub struct Computer {
    cpu: Cpu,
    ia: Word,
    queueing: bool,
    queue: VecDeque<Word>,
    mailbox: Arc<Mutex<Vec<Word>>>,
    devices: Vec<AttachedDevice>,
    active: Arc<AtomicBool>,
}

impl Computer {
    #[must_use]
    pub fn new(memory: Arc<Memory>) -> Self {
        Self {
            cpu: Cpu::new(memory),
            ia: 0,
            queueing: false,
            queue: VecDeque::new(),
            mailbox: Arc::new(Mutex::new(Vec::new())),
            devices: Vec::new(),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    #[must_use]
    pub fn memory(&self) -> &Arc<Memory> {
        &self.cpu.memory
    }

    #[must_use]
    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Spawn `device` on its own thread, parked waiting for its channel to
    /// be triggered by `HWI`.
    pub fn attach(&mut self, device: impl Device + 'static) {
        let info = device.info();
        let channel = Arc::new(InterruptChannel::new());
        let ctx = DeviceContext::new(
            self.cpu.clone(),
            Arc::clone(&channel),
            Arc::clone(&self.active),
            Arc::clone(&self.mailbox),
        );
        let boxed: Box<dyn Device> = Box::new(device);
        let handle = thread::spawn(move || boxed.run(ctx));
        self.devices.push(AttachedDevice {
            info,
            channel,
            handle: Some(handle),
        });
    }

    /// Flip the shutdown flag, wake every parked device, and join their
    /// threads. Idempotent.
    pub fn shutdown(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        for device in &mut self.devices {
            device.channel.notify_all();
            if let Some(handle) = device.handle.take() {
                let _ = handle.join();
            }
        }
    }

    /// Run one instruction's worth of work: a single skipped instruction, or
    /// one executed instruction, with the interrupt queue drained first.
    pub fn step(&mut self) -> Result<(), Error> {
        if !self.is_active() {
            return Ok(());
        }

        self.drain_mailbox();
        self.deliver_queued_interrupt()?;

        if self.cpu.with_registers(|r| r.skip) {
            self.skip_one()
        } else {
            self.execute_one()
        }
    }

    /// Step until the machine is shut down or a step fails.
    pub fn run(&mut self) -> Result<(), Error> {
        while self.is_active() {
            self.step()?;
        }
        Ok(())
    }

    fn drain_mailbox(&mut self) {
        let mut mailbox = self
            .mailbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.queue.extend(mailbox.drain(..));
    }

    /// If dequeuing is enabled and a message is waiting, deliver it: push PC
    /// and A, jump to IA, and load A with the message. An IA of zero drops
    /// the interrupt instead of delivering it.
    fn deliver_queued_interrupt(&mut self) -> Result<(), Error> {
        if self.queueing {
            return Ok(());
        }
        let Some(message) = self.queue.pop_front() else {
            return Ok(());
        };
        if self.ia == 0 {
            return Ok(());
        }

        self.queueing = true;
        let (pc, a) = self.cpu.with_registers(|r| (r.pc, r.a));
        push(&self.cpu, pc)?;
        push(&self.cpu, a)?;
        let target = self.ia;
        self.cpu.with_registers(|r| {
            r.pc = target;
            r.a = message;
        });
        Ok(())
    }

    /// Decode-but-don't-execute the next instruction: advance PC past it,
    /// tick one cycle, and keep `skip` set only if it's itself conditional.
    fn skip_one(&mut self) -> Result<(), Error> {
        let word = self.cpu.fetch_instruction_word()?;
        let instruction = decode(word)?;
        let extra = instruction.size() - 1;
        let keep_skipping = instruction.is_conditional();
        self.cpu.with_registers(|r| {
            r.pc = r.pc.wrapping_add(extra);
            r.cycles += 1;
            r.skip = keep_skipping;
        });
        Ok(())
    }

    fn execute_one(&mut self) -> Result<(), Error> {
        let word = self.cpu.fetch_instruction_word()?;
        match decode(word)? {
            Instruction::Binary {
                opcode,
                mut b,
                mut a,
            } => {
                self.cpu.tick(opcode.cycles());
                self.execute_binary(opcode, &mut b, &mut a)
            }
            Instruction::Unary { opcode, mut a } => {
                self.cpu.tick(opcode.cycles());
                self.execute_unary(opcode, &mut a)
            }
        }
    }

    fn execute_binary(
        &mut self,
        opcode: Opcode,
        b: &mut AddressingMode,
        a: &mut AddressingMode,
    ) -> Result<(), Error> {
        let av = load(&self.cpu, a)?;
        let bv = load(&self.cpu, b)?;

        if opcode.is_conditional() {
            if !conditional_predicate(opcode, bv, av) {
                self.cpu.with_registers(|r| r.skip = true);
                self.cpu.tick(1);
            }
            return Ok(());
        }

        let ex = self.cpu.with_registers(|r| r.ex);
        let (result, new_ex) = arithmetic(opcode, bv, av, ex);

        if let Some(new_ex) = new_ex {
            self.cpu.with_registers(|r| r.ex = new_ex);
        }
        match opcode {
            Opcode::Sti => self.cpu.with_registers(|r| {
                r.i = r.i.wrapping_add(1);
                r.j = r.j.wrapping_add(1);
            }),
            Opcode::Std => self.cpu.with_registers(|r| {
                r.i = r.i.wrapping_sub(1);
                r.j = r.j.wrapping_sub(1);
            }),
            _ => {}
        }

        store(&self.cpu, b, result)
    }

    fn execute_unary(&mut self, opcode: SpecialOpcode, a: &mut AddressingMode) -> Result<(), Error> {
        match opcode {
            SpecialOpcode::Jsr => {
                let target = load(&self.cpu, a)?;
                let pc = self.cpu.with_registers(|r| r.pc);
                push(&self.cpu, pc)?;
                self.cpu.with_registers(|r| r.pc = target);
                Ok(())
            }
            SpecialOpcode::Int => {
                let message = load(&self.cpu, a)?;
                self.queue.push_back(message);
                Ok(())
            }
            SpecialOpcode::Iag => {
                let ia = self.ia;
                store(&self.cpu, a, ia)
            }
            SpecialOpcode::Ias => {
                self.ia = load(&self.cpu, a)?;
                Ok(())
            }
            SpecialOpcode::Rfi => {
                self.queueing = false;
                let a_value = pop(&self.cpu)?;
                let pc_value = pop(&self.cpu)?;
                self.cpu.with_registers(|r| {
                    r.a = a_value;
                    r.pc = pc_value;
                });
                Ok(())
            }
            SpecialOpcode::Iaq => {
                self.queueing = load(&self.cpu, a)? != 0;
                Ok(())
            }
            SpecialOpcode::Hwn => {
                let count = self.devices.len() as Word;
                self.cpu.with_registers(|r| r.a = count);
                Ok(())
            }
            SpecialOpcode::Hwq => {
                let index = load(&self.cpu, a)? as usize;
                if let Some(device) = self.devices.get(index) {
                    let info = device.info;
                    self.cpu.with_registers(|r| {
                        r.a = (info.id & 0xFFFF) as Word;
                        r.b = (info.id >> 16) as Word;
                        r.c = info.version;
                        r.x = (info.manufacturer & 0xFFFF) as Word;
                        r.y = (info.manufacturer >> 16) as Word;
                    });
                }
                Ok(())
            }
            SpecialOpcode::Hwi => {
                let index = load(&self.cpu, a)? as usize;
                if let Some(device) = self.devices.get(index) {
                    device.channel.trigger(&self.active);
                }
                Ok(())
            }
        }
    }
}

impl Drop for Computer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn conditional_predicate(opcode: Opcode, b: Word, a: Word) -> bool {
    match opcode {
        Opcode::Ifb => (b & a) != 0,
        Opcode::Ifc => (b & a) == 0,
        Opcode::Ife => b == a,
        Opcode::Ifn => b != a,
        Opcode::Ifg => b > a,
        Opcode::Ifl => b < a,
        Opcode::Ifa => (b as SignedWord) > (a as SignedWord),
        Opcode::Ifu => (b as SignedWord) < (a as SignedWord),
        _ => unreachable!("conditional_predicate called with a non-conditional opcode"),
    }
}

/// Compute the stored result and (if the op touches it) the new EX, for every
/// non-conditional binary opcode.
fn arithmetic(opcode: Opcode, b: Word, a: Word, ex: Word) -> (Word, Option<Word>) {
    match opcode {
        Opcode::Set | Opcode::Sti | Opcode::Std => (a, None),
        Opcode::Add => {
            let sum = DoubleWord::from(b) + DoubleWord::from(a);
            (sum as Word, Some(Word::from(sum > 0xFFFF)))
        }
        Opcode::Sub => {
            let diff = DoubleWord::from(b).wrapping_sub(DoubleWord::from(a));
            (diff as Word, Some(if b < a { 0xFFFF } else { 0 }))
        }
        Opcode::Mul => {
            let product = DoubleWord::from(b) * DoubleWord::from(a);
            (product as Word, Some((product >> 16) as Word))
        }
        Opcode::Mli => {
            let product = i32::from(b as SignedWord) * i32::from(a as SignedWord);
            (product as Word, Some(((product >> 16) & 0xFFFF) as Word))
        }
        Opcode::Div => {
            if a == 0 {
                (0, Some(0))
            } else {
                let quotient = (DoubleWord::from(b) << 16) / DoubleWord::from(a);
                (b / a, Some((quotient & 0xFFFF) as Word))
            }
        }
        Opcode::Dvi => {
            if a == 0 {
                (0, None)
            } else {
                (((b as SignedWord).wrapping_div(a as SignedWord)) as Word, None)
            }
        }
        Opcode::Mod => {
            if a == 0 {
                (0, None)
            } else {
                (b % a, None)
            }
        }
        Opcode::Mdi => {
            if a == 0 {
                (0, None)
            } else {
                (((b as SignedWord).wrapping_rem(a as SignedWord)) as Word, None)
            }
        }
        Opcode::And => (b & a, None),
        Opcode::Bor => (b | a, None),
        Opcode::Xor => (b ^ a, None),
        Opcode::Shr => {
            let shift = u32::from(a);
            let result = b.checked_shr(shift).unwrap_or(0);
            let widened = (u32::from(b) << 16).checked_shr(shift).unwrap_or(0);
            (result, Some((widened & 0xFFFF) as Word))
        }
        Opcode::Asr => {
            let shift = u32::from(a);
            let signed = i32::from(b as SignedWord);
            let saturate = if signed < 0 { -1 } else { 0 };
            let result = signed.checked_shr(shift).unwrap_or(saturate) as Word;
            let widened = (i64::from(signed) << 16)
                .checked_shr(shift)
                .unwrap_or(i64::from(saturate));
            (result, Some((widened & 0xFFFF) as Word))
        }
        Opcode::Shl => {
            let shift = u32::from(a);
            let widened = u32::from(b).checked_shl(shift).unwrap_or(0);
            (widened as Word, Some((widened >> 16) as Word))
        }
        Opcode::Adx => {
            let sum = DoubleWord::from(b) + DoubleWord::from(a) + DoubleWord::from(ex);
            (sum as Word, Some(Word::from(sum > 0xFFFF)))
        }
        Opcode::Sbx => {
            let diff = i64::from(b) - i64::from(a) + i64::from(ex);
            let overflowed = !(0..=0xFFFF).contains(&diff);
            (diff as Word, Some(Word::from(overflowed)))
        }
        Opcode::Ifb
        | Opcode::Ifc
        | Opcode::Ife
        | Opcode::Ifn
        | Opcode::Ifg
        | Opcode::Ifa
        | Opcode::Ifl
        | Opcode::Ifu => unreachable!("conditional opcodes are handled before this point"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn computer_with(words: &[Word]) -> Computer {
        let memory = Memory::new();
        for (i, &w) in words.iter().enumerate() {
            memory.write(i as Word, w).unwrap();
        }
        Computer::new(Arc::new(memory))
    }

    /// Binary instruction word: opcode in the low 5 bits, B in the next 5,
    /// A in the top 6.
    fn binary(opcode: u16, b: u16, a: u16) -> Word {
        opcode | (b << 5) | (a << 10)
    }

    /// Unary (special) instruction word: low 5 bits zero, the special
    /// opcode in bits 5..9, A in the top 6.
    fn unary(opcode: u16, a: u16) -> Word {
        (opcode << 5) | (a << 10)
    }

    const FAST_DIRECT_NEG_ONE: u16 = 0x20;

    fn fast_direct(value: u16) -> u16 {
        0x21 + value
    }

    #[test]
    fn set_a_literal() {
        // SET A, 0x1234
        let mut computer = computer_with(&[binary(0x01, 0x00, 0x1F), 0x1234]);
        computer.step().unwrap();
        let regs = computer.registers();
        assert_eq!(regs.a, 0x1234);
        assert_eq!(regs.pc, 2);
        assert_eq!(regs.cycles, 2);
    }

    #[test]
    fn add_with_fast_direct_negative_one() {
        // ADD A, 0xFFFF ; A starts at 2
        let mut computer = computer_with(&[binary(0x02, 0x00, FAST_DIRECT_NEG_ONE)]);
        computer.cpu().with_registers(|r| r.a = 2);
        computer.step().unwrap();
        let regs = computer.registers();
        assert_eq!(regs.a, 1);
        assert_eq!(regs.ex, 1);
        assert_eq!(regs.cycles, 2);
    }

    #[test]
    fn div_by_zero_yields_zero_not_an_error() {
        // DIV A, 0 ; A starts at 100
        let mut computer = computer_with(&[binary(0x06, 0x00, fast_direct(0))]);
        computer.cpu().with_registers(|r| r.a = 100);
        computer.step().unwrap();
        let regs = computer.registers();
        assert_eq!(regs.a, 0);
        assert_eq!(regs.ex, 0);
    }

    #[test]
    fn chained_if_skip() {
        // IFE A, 5 ; IFE B, 5 ; SET C, 1 ; SET X, 1 ; with A=3
        let mut computer = computer_with(&[
            binary(0x12, 0x00, fast_direct(5)), // IFE A, 5
            binary(0x12, 0x01, fast_direct(5)), // IFE B, 5
            binary(0x01, 0x02, fast_direct(1)), // SET C, 1
            binary(0x01, 0x03, fast_direct(1)), // SET X, 1
        ]);
        computer.cpu().with_registers(|r| r.a = 3);
        for _ in 0..4 {
            computer.step().unwrap();
        }
        let regs = computer.registers();
        assert_eq!(regs.c, 0);
        assert_eq!(regs.x, 1);
        assert!(!regs.skip);
    }

    #[test]
    fn single_if_skip_clears_after_one_instruction() {
        // IFE A, 5 ; SET B, 1 ; SET C, 2 ; with A=3
        let mut computer = computer_with(&[
            binary(0x12, 0x00, fast_direct(5)), // IFE A, 5
            binary(0x01, 0x01, fast_direct(1)), // SET B, 1
            binary(0x01, 0x02, fast_direct(2)), // SET C, 2
        ]);
        computer.cpu().with_registers(|r| r.a = 3);
        for _ in 0..3 {
            computer.step().unwrap();
        }
        let regs = computer.registers();
        assert_eq!(regs.b, 0);
        assert_eq!(regs.c, 2);
        assert!(!regs.skip);
    }

    #[test]
    fn jsr_pushes_return_address_and_jumps() {
        let mut computer = computer_with(&[]);
        computer.cpu().with_registers(|r| r.pc = 0x10);
        computer
            .cpu()
            .memory
            .write(0x10, unary(0x01, 0x1F))
            .unwrap();
        computer.cpu().memory.write(0x11, 0x0100).unwrap();

        computer.step().unwrap();

        let regs = computer.registers();
        assert_eq!(regs.pc, 0x0100);
        assert_eq!(regs.sp, 0xFFFF);
        assert_eq!(computer.cpu().memory.read(0xFFFF).unwrap(), 0x12);
    }

    #[test]
    fn hwn_reports_attached_device_count() {
        let mut computer = computer_with(&[unary(0x10, 0x00)]); // HWN
        computer.step().unwrap();
        assert_eq!(computer.registers().a, 0);
    }

    #[test]
    fn sub_sets_ex_to_0xffff_on_underflow() {
        // SUB A, 1 ; A starts at 0
        let mut computer = computer_with(&[binary(0x03, 0x00, fast_direct(1))]);
        computer.step().unwrap();
        let regs = computer.registers();
        assert_eq!(regs.a, 0xFFFF);
        assert_eq!(regs.ex, 0xFFFF);
    }

    #[test]
    fn sti_advances_i_and_j() {
        // STI B, A ; A holds 7
        let mut computer = computer_with(&[binary(0x1E, 0x01, 0x00)]);
        computer.cpu().with_registers(|r| {
            r.a = 7;
            r.i = 0;
            r.j = 0;
        });
        computer.step().unwrap();
        let regs = computer.registers();
        assert_eq!(regs.b, 7);
        assert_eq!(regs.i, 1);
        assert_eq!(regs.j, 1);
    }

    #[test]
    fn pop_underflow_is_reachable_on_a_small_memory() {
        let memory = Memory::with_size(4);
        let mut computer = Computer::new(Arc::new(memory));
        // POP into A, with SP already parked at the top of this tiny memory.
        computer
            .cpu()
            .memory
            .write(0, binary(0x01, 0x00, 0x18))
            .unwrap();
        computer.cpu().with_registers(|r| r.sp = 3);
        let err = computer.step().unwrap_err();
        assert_eq!(err, Error::StackUnderflow);
    }
}
