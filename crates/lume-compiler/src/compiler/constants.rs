//! Per-function constant pool with value deduplication.

use crate::proto::Constant;
use lume_core::number::as_exact_i32;
use lume_core::string::StringId;
use std::collections::HashMap;

/// Hashable identity of a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ConstantKey {
    Nil,
    Boolean(bool),
    Number(u64),
    String(StringId),
}

/// Integral numbers are stored in a canonical form so that `1`, `1.0` and
/// `-0` collapse onto the same slot as their integer spelling.
pub fn normalize_number(n: f64) -> f64 {
    match as_exact_i32(n) {
        Some(i) => i as f64,
        None => n,
    }
}

impl ConstantKey {
    fn of(k: &Constant) -> Self {
        match *k {
            Constant::Nil => ConstantKey::Nil,
            Constant::Boolean(b) => ConstantKey::Boolean(b),
            Constant::Number(n) => ConstantKey::Number(n.to_bits()),
            Constant::String(id) => ConstantKey::String(id),
        }
    }
}

/// Constants of one function in insertion order, plus the lookup index
/// used while the function is being compiled.
#[derive(Debug, Default)]
pub struct ConstantPool {
    values: Vec<Constant>,
    index: HashMap<ConstantKey, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `k`, returning its index. Returns `None` if the pool already
    /// holds `max` distinct constants and `k` is new.
    pub fn add(&mut self, k: Constant, max: u32) -> Option<u32> {
        let k = match k {
            Constant::Number(n) => Constant::Number(normalize_number(n)),
            other => other,
        };
        let key = ConstantKey::of(&k);
        if let Some(&idx) = self.index.get(&key) {
            return Some(idx);
        }
        let idx = self.values.len() as u32;
        if idx >= max {
            return None;
        }
        self.values.push(k);
        self.index.insert(key, idx);
        Some(idx)
    }

    pub fn get(&self, idx: u32) -> Option<&Constant> {
        self.values.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the pool, discarding the lookup index.
    pub fn into_constants(self) -> Vec<Constant> {
        self.values
    }
}
