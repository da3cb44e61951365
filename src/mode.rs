// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// Means of getting around, used to decide which edges a traveller may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TravelMode {
    Foot = 0,
    Bicycle = 1,
    Car = 2,

    /// Riding a scheduled public transport vehicle.
    Transit = 3,
}

impl TravelMode {
    pub const ALL: [TravelMode; 4] = [Self::Foot, Self::Bicycle, Self::Car, Self::Transit];

    #[inline]
    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foot => write!(f, "foot"),
            Self::Bicycle => write!(f, "bicycle"),
            Self::Car => write!(f, "car"),
            Self::Transit => write!(f, "transit"),
        }
    }
}

/// Compact set of [TravelModes](TravelMode).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const EMPTY: Self = Self(0);
    pub const FOOT: Self = Self(1);
    pub const BICYCLE: Self = Self(2);
    pub const CAR: Self = Self(4);
    pub const TRANSIT: Self = Self(8);

    /// All modes which may use road edges.
    pub const ROAD: Self = Self(1 | 2 | 4);

    pub fn of(modes: &[TravelMode]) -> Self {
        modes.iter().fold(Self::EMPTY, |acc, &m| acc | m.into())
    }

    #[inline]
    pub fn contains(self, mode: TravelMode) -> bool {
        self.0 & mode.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, mode: TravelMode) {
        self.0 |= mode.bit();
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = TravelMode> {
        TravelMode::ALL.into_iter().filter(move |&m| self.contains(m))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub(crate) fn from_bits(bits: u8) -> Option<Self> {
        if bits & !0b1111 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }
}

impl From<TravelMode> for ModeSet {
    fn from(mode: TravelMode) -> Self {
        Self(mode.bit())
    }
}

impl BitOr for ModeSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ModeSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ModeSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for ModeSet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}
