/*!
  Per-opcode execution semantics. `execute` dispatches one decoded instruction against
  the machine state; the fetch/decode/advance plumbing around it lives on
  `Emulator::step`.

  The overflow flag follows the sign rule, with zero counting as positive: add overflows
  when both operands have the same effective sign and the result's sign differs; sub
  overflows when the operands' signs differ and the result's sign differs from the
  minuend's. This is the contract, not a shortcut for range checking.
*/

use crate::bytecode::Instruction;
use crate::keyword::{Keyword, Register};
use crate::emulator::{Emulator, EmulatorException};

fn register_at(instruction: &Instruction, slot: usize) -> Register {
  instruction.registers.get(slot).copied().unwrap_or(Register::ZERO)
}

fn immediate_of(instruction: &Instruction) -> i16 {
  instruction.immediate.unwrap_or(0)
}

impl Emulator {

  pub(crate) fn execute(&mut self, instruction: &Instruction)
    -> Result<(), EmulatorException>
  {
    match instruction.keyword {

      Keyword::Add => {
        let a = self.registers.read(register_at(instruction, 1));
        let b = self.registers.read(register_at(instruction, 2));
        self.add_with_overflow(register_at(instruction, 0), a, b);
      }
      Keyword::Addi => {
        let a = self.registers.read(register_at(instruction, 1));
        let b = immediate_of(instruction) as i32;
        self.add_with_overflow(register_at(instruction, 0), a, b);
      }
      Keyword::Sub => {
        let a = self.registers.read(register_at(instruction, 1));
        let b = self.registers.read(register_at(instruction, 2));
        self.sub_with_overflow(register_at(instruction, 0), a, b);
      }
      Keyword::Subi => {
        let a = self.registers.read(register_at(instruction, 1));
        let b = immediate_of(instruction) as i32;
        self.sub_with_overflow(register_at(instruction, 0), a, b);
      }

      Keyword::Shl | Keyword::Shr | Keyword::Rol | Keyword::Ror => {
        let amount = self.registers.read(register_at(instruction, 2)) as u32;
        self.shift(instruction, amount);
      }
      Keyword::Shli | Keyword::Shri | Keyword::Roli | Keyword::Rori => {
        let amount = immediate_of(instruction) as i32 as u32;
        self.shift(instruction, amount);
      }

      Keyword::Or | Keyword::And | Keyword::Xor | Keyword::Xnor => {
        let a = self.registers.read(register_at(instruction, 1)) as u32;
        let b = self.registers.read(register_at(instruction, 2)) as u32;
        let result = match instruction.keyword {
          Keyword::Or  => a | b,
          Keyword::And => a & b,
          Keyword::Xor => a ^ b,
          _            => !(a ^ b)
        };
        self.write_register(register_at(instruction, 0), result as i32);
      }

      Keyword::Ldd => {
        let base = self.registers.read(register_at(instruction, 1));
        let address = base.wrapping_add(immediate_of(instruction) as i32);
        let value = self.memory.read(address);
        self.write_register(register_at(instruction, 0), value);
      }
      Keyword::Sto => {
        let value = self.registers.read(register_at(instruction, 0));
        let base = self.registers.read(register_at(instruction, 1));
        let address = base.wrapping_add(immediate_of(instruction) as i32);
        self.memory.write(address, value);
      }

      Keyword::Beq | Keyword::Bneq | Keyword::Bgt => {
        let a = self.registers.read(register_at(instruction, 0));
        let b = self.registers.read(register_at(instruction, 1));
        let taken = match instruction.keyword {
          Keyword::Beq  => a == b,
          Keyword::Bneq => a != b,
          _             => a > b
        };
        if taken {
          self.branch(immediate_of(instruction));
        }
      }
      Keyword::Jmp => self.branch(immediate_of(instruction)),
      Keyword::Bo => {
        // The flag is latched before this instruction clears it.
        let latched = self.registers.overflow;
        self.registers.overflow = false;
        if latched {
          self.branch(immediate_of(instruction));
        }
      }

      Keyword::Ldpc => {
        let pc = self.registers.pc as i32;
        self.write_register(register_at(instruction, 0), pc);
      }
      Keyword::Stpc => {
        let value = self.registers.read(register_at(instruction, 0));
        // The automatic +1 after execution lands the counter on `value` itself.
        self.registers.pc = (value as u16).wrapping_sub(1);
      }

      Keyword::Systerm => self.flags.terminated = true,
      Keyword::Sysin => self.drain_input(register_at(instruction, 0)),
      Keyword::SysoutReg => {
        let value = self.registers.read(register_at(instruction, 0));
        self.output.push_str(&value.to_string());
      }
      Keyword::SysoutStr => {
        let offset = immediate_of(instruction) as u16;
        match self.program.string_at(offset) {
          Some(text) => {
            let text = text.to_string();
            self.output.push_str(&text);
          }
          None => return Err(EmulatorException::BadStringOffset { offset })
        }
      }

      // Structural keywords never decode; reaching here is an internal inconsistency.
      _ => {
        return Err(EmulatorException::UndecodableInstruction {
          word : instruction.encode(),
          pc   : self.registers.pc
        });
      }

    } // end match on keyword
    Ok(())
  }

  fn add_with_overflow(&mut self, dest: Register, a: i32, b: i32) {
    let result = a.wrapping_add(b);
    self.registers.overflow = (a >= 0) == (b >= 0) && (result >= 0) != (a >= 0);
    self.write_register(dest, result);
  }

  fn sub_with_overflow(&mut self, dest: Register, a: i32, b: i32) {
    let result = a.wrapping_sub(b);
    self.registers.overflow = (a >= 0) != (b >= 0) && (result >= 0) != (a >= 0);
    self.write_register(dest, result);
  }

  fn shift(&mut self, instruction: &Instruction, amount: u32) {
    let value = self.registers.read(register_at(instruction, 1)) as u32;
    let amount = amount % 32;
    let result = match instruction.keyword {
      Keyword::Shl | Keyword::Shli => value << amount,
      Keyword::Shr | Keyword::Shri => value >> amount,
      Keyword::Rol | Keyword::Roli => value.rotate_left(amount),
      _                            => value.rotate_right(amount)
    };
    self.write_register(register_at(instruction, 0), result as i32);
  }

  fn branch(&mut self, displacement: i16) {
    // Minus one to cancel the automatic advance after execution.
    let target = self.registers.pc as i32 + displacement as i32 - 1;
    self.registers.pc = target as u16;
  }

  pub(crate) fn write_register(&mut self, register: Register, value: i32) {
    if !self.registers.write(register, value) {
      self.warnings.push(format!("dropped write of {} to register zero", value));
    }
  }

  /// Reads queued input lines until one parses as an integer. An exhausted queue leaves
  /// the machine expecting input with the program counter unadvanced, so the same
  /// instruction retries when more input arrives.
  fn drain_input(&mut self, dest: Register) {
    loop {
      if self.flags.force_terminated {
        return;
      }
      match self.input_lines.pop_front() {
        Some(line) => {
          if let Ok(value) = line.trim().parse::<i32>() {
            self.write_register(dest, value);
            self.flags.expecting_input = false;
            return;
          }
          // Not an integer; keep draining.
        }
        None => {
          self.flags.expecting_input = true;
          return;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::ProgramStorage;
  use crate::emulator::storage::SplitMix64;

  fn machine() -> Emulator {
    Emulator::with_random(ProgramStorage::new(), Box::new(SplitMix64::new(99)))
  }

  fn reg(index: u8) -> Register {
    Register::new(index).unwrap()
  }

  fn run_one(emulator: &mut Emulator, keyword: Keyword, registers: Vec<Register>, immediate: Option<i16>) {
    let instruction = Instruction { keyword, registers, immediate };
    emulator.execute(&instruction).unwrap();
  }

  #[test]
  fn add_overflow_truth_table() {
    let mut emulator = machine();
    let cases: [(i32, i32, bool); 6] = [
      (i32::MAX, 1, true),            // same positive signs, sign flips
      (i32::MIN, -1, true),           // same negative signs, sign flips
      (1, 2, false),                  // same signs, no flip
      (i32::MAX, i32::MIN, false),    // opposite signs never overflow
      (0, i32::MAX, false),           // zero counts as positive, no flip
      (i32::MIN, 0, false)            // negative plus "positive" zero
    ];
    for &(a, b, expected) in cases.iter() {
      emulator.registers.write(reg(1), a);
      emulator.registers.write(reg(2), b);
      run_one(&mut emulator, Keyword::Add, vec![reg(3), reg(1), reg(2)], None);
      assert_eq!(emulator.registers.overflow, expected, "add {} + {}", a, b);
      assert_eq!(emulator.registers.read(reg(3)), a.wrapping_add(b));
    }
  }

  #[test]
  fn sub_overflow_truth_table() {
    let mut emulator = machine();
    let cases: [(i32, i32, bool); 4] = [
      (i32::MAX, -1, true),   // opposite signs, result sign differs from minuend
      (i32::MIN, 1, true),
      (5, 3, false),          // same signs never overflow
      (0, i32::MIN, true)     // zero minuend counts positive; result is negative... 0 - MIN wraps to MIN
    ];
    for &(a, b, expected) in cases.iter() {
      emulator.registers.write(reg(1), a);
      emulator.registers.write(reg(2), b);
      run_one(&mut emulator, Keyword::Sub, vec![reg(3), reg(1), reg(2)], None);
      assert_eq!(emulator.registers.overflow, expected, "sub {} - {}", a, b);
    }
  }

  #[test]
  fn shifts_reinterpret_unsigned_and_wrap_the_amount() {
    let mut emulator = machine();
    emulator.registers.write(reg(1), -1);
    emulator.registers.write(reg(2), 33); // taken modulo 32
    run_one(&mut emulator, Keyword::Shr, vec![reg(3), reg(1), reg(2)], None);
    // Logical, not arithmetic: the sign bit does not smear.
    assert_eq!(emulator.registers.read(reg(3)), 0x7FFF_FFFF);

    emulator.registers.write(reg(1), 0x8000_0001u32 as i32);
    run_one(&mut emulator, Keyword::Roli, vec![reg(3), reg(1)], Some(1));
    assert_eq!(emulator.registers.read(reg(3)), 3);
  }

  #[test]
  fn bitwise_xnor_complements_xor() {
    let mut emulator = machine();
    emulator.registers.write(reg(1), 0b1100);
    emulator.registers.write(reg(2), 0b1010);
    run_one(&mut emulator, Keyword::Xnor, vec![reg(3), reg(1), reg(2)], None);
    assert_eq!(emulator.registers.read(reg(3)) as u32, !(0b1100u32 ^ 0b1010u32));
  }

  #[test]
  fn load_and_store_share_an_address_computation() {
    let mut emulator = machine();
    emulator.registers.write(reg(1), 1000);
    emulator.registers.write(reg(2), -42);
    run_one(&mut emulator, Keyword::Sto, vec![reg(2), reg(1)], Some(24));
    run_one(&mut emulator, Keyword::Ldd, vec![reg(3), reg(1)], Some(24));
    assert_eq!(emulator.registers.read(reg(3)), -42);
    assert_eq!(emulator.memory.read(1024), -42);
  }

  #[test]
  fn bo_tests_then_clears_the_flag() {
    let mut emulator = machine();
    emulator.registers.pc = 10;
    emulator.registers.overflow = true;
    run_one(&mut emulator, Keyword::Bo, vec![], Some(5));
    assert_eq!(emulator.registers.pc, 14); // 10 + 5 - 1
    assert!(!emulator.registers.overflow);
    // A second bo with the flag now clear does not branch.
    run_one(&mut emulator, Keyword::Bo, vec![], Some(5));
    assert_eq!(emulator.registers.pc, 14);
  }

  #[test]
  fn ldpc_and_stpc_move_the_counter() {
    let mut emulator = machine();
    emulator.registers.pc = 7;
    run_one(&mut emulator, Keyword::Ldpc, vec![reg(4)], None);
    assert_eq!(emulator.registers.read(reg(4)), 7);

    emulator.registers.write(reg(5), 20);
    run_one(&mut emulator, Keyword::Stpc, vec![reg(5)], None);
    // The step's automatic advance lands the counter on 20 itself.
    assert_eq!(emulator.registers.pc, 19);
  }

  #[test]
  fn writes_to_register_zero_warn_and_drop() {
    let mut emulator = machine();
    emulator.registers.write(reg(1), 1);
    emulator.registers.write(reg(2), 2);
    run_one(&mut emulator, Keyword::Add, vec![reg(0), reg(1), reg(2)], None);
    assert_eq!(emulator.registers.read(reg(0)), 0);
    assert_eq!(emulator.warnings.len(), 1);
  }

  #[test]
  fn sysin_drains_until_an_integer_or_exhaustion() {
    let mut emulator = machine();
    emulator.queue_input_line("not a number");
    emulator.queue_input_line("  17 ");
    run_one(&mut emulator, Keyword::Sysin, vec![reg(6)], None);
    assert_eq!(emulator.registers.read(reg(6)), 17);
    assert!(!emulator.flags.expecting_input);

    run_one(&mut emulator, Keyword::Sysin, vec![reg(6)], None);
    assert!(emulator.flags.expecting_input);
  }
}
