//! Notification classes and their lookup table

use serde::{Deserialize, Serialize};

/// A notification offset before an event's NET
///
/// Declaration order is the scan order used by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotificationClass {
    #[serde(rename = "24h")]
    T24h,
    #[serde(rename = "12h")]
    T12h,
    #[serde(rename = "1h")]
    T1h,
    #[serde(rename = "5m")]
    T5m,
}

impl NotificationClass {
    /// All classes in fixed scan order
    pub const ALL: [NotificationClass; 4] = [Self::T24h, Self::T12h, Self::T1h, Self::T5m];

    /// Position in [`NotificationClass::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u8 {
        1 << self.index()
    }

    /// Urgent classes are delivered with sound; the rest are sent silently
    pub fn is_urgent(self) -> bool {
        matches!(self, Self::T1h | Self::T5m)
    }

    /// Human readable lead, e.g. "24 hours"
    pub fn lead_label(self) -> &'static str {
        match self {
            Self::T24h => "24 hours",
            Self::T12h => "12 hours",
            Self::T1h => "1 hour",
            Self::T5m => "5 minutes",
        }
    }
}

impl std::fmt::Display for NotificationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::T24h => write!(f, "24h"),
            Self::T12h => write!(f, "12h"),
            Self::T1h => write!(f, "1h"),
            Self::T5m => write!(f, "5m"),
        }
    }
}

impl std::str::FromStr for NotificationClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "24h" | "t24h" => Ok(Self::T24h),
            "12h" | "t12h" => Ok(Self::T12h),
            "1h" | "t1h" => Ok(Self::T1h),
            "5m" | "t5m" => Ok(Self::T5m),
            _ => Err(format!("Unknown notification class: {}", s)),
        }
    }
}

/// A set of notification classes stored as a bit set
///
/// Used for an event's sent flags, for classes reset by a slip and for a
/// subscriber's enabled classes. Iteration always follows scan order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassSet(u8);

impl ClassSet {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every class
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// Rebuild from the persisted bit representation, ignoring unknown bits
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::all().0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, class: NotificationClass) -> bool {
        self.0 & class.bit() != 0
    }

    /// Add a class, returning true if it was not present
    pub fn insert(&mut self, class: NotificationClass) -> bool {
        let added = !self.contains(class);
        self.0 |= class.bit();
        added
    }

    /// Remove a class, returning true if it was present
    pub fn remove(&mut self, class: NotificationClass) -> bool {
        let present = self.contains(class);
        self.0 &= !class.bit();
        present
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn intersects(self, other: ClassSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Members in scan order
    pub fn iter(self) -> impl Iterator<Item = NotificationClass> {
        NotificationClass::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<NotificationClass> for ClassSet {
    fn from_iter<I: IntoIterator<Item = NotificationClass>>(iter: I) -> Self {
        let mut set = ClassSet::empty();
        for class in iter {
            set.insert(class);
        }
        set
    }
}

impl Serialize for ClassSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ClassSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let classes = Vec::<NotificationClass>::deserialize(deserializer)?;
        Ok(classes.into_iter().collect())
    }
}

/// Lead time and tie-break weight for one class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassSpec {
    pub class: NotificationClass,
    /// Seconds before NET the notification is due
    pub lead_secs: i64,
    /// Higher weight wins when classes are due at the same instant
    pub weight: u32,
}

/// Immutable class lookup table, built once at startup and shared by reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    specs: [ClassSpec; 4],
}

impl ClassTable {
    /// The standard 24h / 12h / 1h / 5m table
    pub fn standard() -> Self {
        Self {
            specs: [
                ClassSpec {
                    class: NotificationClass::T24h,
                    lead_secs: 24 * 3600,
                    weight: 1,
                },
                ClassSpec {
                    class: NotificationClass::T12h,
                    lead_secs: 12 * 3600,
                    weight: 2,
                },
                ClassSpec {
                    class: NotificationClass::T1h,
                    lead_secs: 3600,
                    weight: 3,
                },
                ClassSpec {
                    class: NotificationClass::T5m,
                    lead_secs: 5 * 60,
                    weight: 4,
                },
            ],
        }
    }

    pub fn spec(&self, class: NotificationClass) -> &ClassSpec {
        &self.specs[class.index()]
    }

    pub fn lead_secs(&self, class: NotificationClass) -> i64 {
        self.spec(class).lead_secs
    }

    pub fn weight(&self, class: NotificationClass) -> u32 {
        self.spec(class).weight
    }

    /// Specs in scan order
    pub fn iter(&self) -> impl Iterator<Item = &ClassSpec> {
        self.specs.iter()
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::standard()
    }
}
