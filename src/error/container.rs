//! Location-carrying wrappers for errors, and the container that the library
//! interface returns them in.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// An error pinned to the byte offset in the bytecode at which it arose.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The byte offset in the bytecode where the error occurred.
    pub location: usize,

    pub payload: E,
}

impl<E> Located<E>
where
    E: Clone,
{
    /// Converts the payload with `f`, keeping the location.
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> Located<F>
    where
        F: Clone,
    {
        Located {
            location: self.location,
            payload:  f(self.payload),
        }
    }
}

impl<E> Display for Located<E>
where
    E: Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[0x{:04x}]: {}", self.location, self.payload)
    }
}

/// Things that can be given a byte offset in the bytecode.
pub trait Locatable
where
    Self: Sized,
{
    type Located;

    /// Attaches the byte `offset` to `self`.
    fn locate(self, offset: usize) -> Self::Located;
}

/// Locating a result locates its error, if it has one.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, offset: usize) -> Self::Located {
        self.map_err(|payload| Located {
            location: offset,
            payload,
        })
    }
}

/// Implements [`Locatable`] for the error type, and names its located form
/// `LocatedError` in the caller's module.
///
/// It can only be invoked once per module.
macro_rules! locatable {
    ($error:ty) => {
        /// An error with an associated location in the bytecode.
        pub type LocatedError = $crate::error::container::Located<$error>;

        impl $crate::error::container::Locatable for $error {
            type Located = LocatedError;

            fn locate(self, offset: usize) -> Self::Located {
                $crate::error::container::Located {
                    location: offset,
                    payload:  self,
                }
            }
        }
    };
}

pub(crate) use locatable;

/// A collection of located errors, kept in the order in which their locations
/// occur in the bytecode.
///
/// Errors at the same location stay in the order they were added.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Errors<E> {
    payloads: Vec<E>,
}

impl<E> Errors<E> {
    #[must_use]
    pub fn new() -> Self {
        Self { payloads: vec![] }
    }

    /// Gets the errors in the container.
    #[must_use]
    pub fn payloads(&self) -> &[E] {
        &self.payloads
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.payloads.iter()
    }
}

impl<E> Errors<Located<E>>
where
    E: Clone,
{
    /// Adds `error`, after any existing errors at or before its location.
    pub fn add(&mut self, error: Located<E>) {
        let index = self
            .payloads
            .partition_point(|existing| existing.location <= error.location);
        self.payloads.insert(index, error);
    }

    /// Adds the error `payload` at the specific `offset` in the bytecode.
    pub fn add_located(&mut self, offset: usize, payload: E) {
        self.add(Located {
            location: offset,
            payload,
        });
    }

    /// Gets the error that occurs earliest in the bytecode.
    #[must_use]
    pub fn first(&self) -> Option<&Located<E>> {
        self.payloads.first()
    }
}

impl<E> Default for Errors<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<Located<E>> for Errors<Located<E>>
where
    E: Clone,
{
    fn from(value: Located<E>) -> Self {
        Self {
            payloads: vec![value],
        }
    }
}

impl<E> FromIterator<Located<E>> for Errors<Located<E>>
where
    E: Clone,
{
    fn from_iter<I: IntoIterator<Item = Located<E>>>(iter: I) -> Self {
        let mut errors = Self::new();
        errors.extend(iter);
        errors
    }
}

impl<E> Extend<Located<E>> for Errors<Located<E>>
where
    E: Clone,
{
    fn extend<I: IntoIterator<Item = Located<E>>>(&mut self, iter: I) {
        for error in iter {
            self.add(error);
        }
    }
}

impl<E> IntoIterator for Errors<E> {
    type IntoIter = std::vec::IntoIter<E>;
    type Item = E;

    fn into_iter(self) -> Self::IntoIter {
        self.payloads.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a Errors<E> {
    type IntoIter = std::slice::Iter<'a, E>;
    type Item = &'a E;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Prints a count followed by one error per line.
impl<E> Display for Errors<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.payloads.len() {
            0 => write!(f, "Encountered no errors"),
            1 => write!(f, "{}", self.payloads[0]),
            count => {
                writeln!(f, "Encountered {count} errors:")?;
                self.payloads.iter().try_for_each(|error| writeln!(f, "{error}"))
            }
        }
    }
}
