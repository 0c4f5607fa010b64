/*!
  Register and memory state.

  Both storages mimic undefined-at-reset hardware: a register other than zero and the
  stack pointer resets to an arbitrary value, and a memory cell that was never written
  materializes an arbitrary value on first read and keeps it thereafter. The arbitrary
  values come from an injectable `RandomSource`, so tests can seed them
  deterministically while normal construction draws on process entropy.
*/

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

use crate::keyword::{Register, REGISTER_COUNT};

pub trait RandomSource {
  fn next_word(&mut self) -> i32;
}

/// The splitmix64 generator. Small, seedable, and more than enough for reset noise.
pub struct SplitMix64 {
  state: u64
}

impl SplitMix64 {
  pub fn new(seed: u64) -> SplitMix64 {
    SplitMix64 { state: seed }
  }
}

impl RandomSource for SplitMix64 {
  fn next_word(&mut self) -> i32 {
    self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = self.state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    (z ^ (z >> 31)) as i32
  }
}

/// The default source: splitmix seeded from the process's hasher entropy, so every
/// construction differs without any extra dependency.
pub fn process_random() -> Box<dyn RandomSource> {
  let seed = RandomState::new().build_hasher().finish();
  Box::new(SplitMix64::new(seed))
}

/// 32 general-purpose 32-bit signed slots plus the program counter and overflow flag.
/// Register 0 is hard-wired: reads return 0 and writes are dropped by the caller.
pub struct RegisterStorage {
  slots        : [i32; REGISTER_COUNT],
  pub pc       : u16,
  pub overflow : bool
}

impl RegisterStorage {

  pub fn reset(random: &mut dyn RandomSource) -> RegisterStorage {
    let mut slots = [0i32; REGISTER_COUNT];
    for (index, slot) in slots.iter_mut().enumerate() {
      *slot = match index {
        0  => 0,
        29 => i32::MAX, // stack pointer
        _  => random.next_word()
      };
    }
    RegisterStorage { slots, pc: 0, overflow: false }
  }

  pub fn read(&self, register: Register) -> i32 {
    match register.index() {
      0     => 0,
      index => self.slots[index]
    }
  }

  /// Returns whether the write took effect; a write to register zero is dropped and the
  /// caller reports the warning.
  pub fn write(&mut self, register: Register, value: i32) -> bool {
    match register.index() {
      0 => false,
      index => {
        self.slots[index] = value;
        true
      }
    }
  }
}

/**
  Sparse word-addressed memory. Logically infinite: reading an address that was never
  written materializes it with the next random word and then behaves like ordinary
  storage, so repeated reads of an untouched address are stable.
*/
pub struct MainStorage {
  cells  : HashMap<i32, i32>,
  random : Box<dyn RandomSource>
}

impl MainStorage {

  pub fn new(random: Box<dyn RandomSource>) -> MainStorage {
    MainStorage { cells: HashMap::new(), random }
  }

  pub fn read(&mut self, address: i32) -> i32 {
    let MainStorage { cells, random } = self;
    *cells.entry(address).or_insert_with(|| random.next_word())
  }

  pub fn write(&mut self, address: i32, value: i32) {
    self.cells.insert(address, value);
  }

  /// The cells that have been touched so far, for display.
  pub fn cells(&self) -> &HashMap<i32, i32> {
    &self.cells
  }
}
