//! This module contains the annotation store that the analysis passes use to
//! attach their results to the instructions and blocks of a
//! [`crate::program::Program`].
//!
//! # Closed Set of Kinds
//!
//! The kinds of annotation are fixed: each pass in [`crate::analysis`] owns
//! exactly one of them. The [`Annotation`] trait is sealed so that the set
//! cannot be extended from outside the crate, which lets the store keep one
//! statically-typed field per kind rather than a map of type-erased values.

use std::fmt::{Debug, Display, Formatter};

use crate::analysis::{
    expression::Expression,
    label::JumpLabel,
    reaches::ReachesSet,
    reaching::ReachingDefinition,
};

/// The kinds of result that can be attached to a program element.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AnnotationKind {
    ReachingDefinition,
    ReachesSet,
    JumpLabel,
    Expression,
}

impl Display for AnnotationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReachingDefinition => "reaching definition",
            Self::ReachesSet => "reaches set",
            Self::JumpLabel => "jump label",
            Self::Expression => "expression",
        };
        write!(f, "{name}")
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A value that can be stored in [`Annotations`].
///
/// This trait is sealed, and is implemented only for the result types of the
/// analysis passes.
pub trait Annotation
where
    Self: sealed::Sealed + Clone + Debug + Sized,
{
    /// The kind of annotation that this type represents.
    const KIND: AnnotationKind;

    /// Gets the field of `store` that holds annotations of this kind.
    #[doc(hidden)]
    fn field(store: &Annotations) -> &Option<Self>;

    /// Gets the field of `store` that holds annotations of this kind, for
    /// modification.
    #[doc(hidden)]
    fn field_mut(store: &mut Annotations) -> &mut Option<Self>;
}

/// The analysis results attached to a single instruction or block.
///
/// At most one value of each [`AnnotationKind`] is stored at any time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Annotations {
    reaching:   Option<ReachingDefinition>,
    reaches:    Option<ReachesSet>,
    label:      Option<JumpLabel>,
    expression: Option<Expression>,
}

impl Annotations {
    /// Gets the annotation of kind `A`, if one is present.
    #[must_use]
    pub fn get<A: Annotation>(&self) -> Option<&A> {
        A::field(self).as_ref()
    }

    /// Gets the annotation of kind `A` for modification, if one is present.
    pub fn get_mut<A: Annotation>(&mut self) -> Option<&mut A> {
        A::field_mut(self).as_mut()
    }

    /// Stores `value`, returning the annotation of the same kind that it
    /// replaced, if any.
    pub fn set<A: Annotation>(&mut self, value: A) -> Option<A> {
        A::field_mut(self).replace(value)
    }

    /// Removes and returns the annotation of kind `A`, if one is present.
    pub fn take<A: Annotation>(&mut self) -> Option<A> {
        A::field_mut(self).take()
    }

    /// Checks if an annotation of kind `A` is present.
    #[must_use]
    pub fn contains<A: Annotation>(&self) -> bool {
        A::field(self).is_some()
    }

    /// Gets the kinds of the annotations that are present, in a fixed order.
    #[must_use]
    pub fn kinds(&self) -> Vec<AnnotationKind> {
        let present = [
            (AnnotationKind::ReachingDefinition, self.reaching.is_some()),
            (AnnotationKind::ReachesSet, self.reaches.is_some()),
            (AnnotationKind::JumpLabel, self.label.is_some()),
            (AnnotationKind::Expression, self.expression.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(kind, is_present)| is_present.then_some(kind))
            .collect()
    }

    /// Checks if no annotations are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Implements [`Annotation`] for each result type, binding it to its field in
/// the store.
macro_rules! annotation_kinds {
    ($($ty:ty => $field:ident as $kind:ident),*$(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Annotation for $ty {
            const KIND: AnnotationKind = AnnotationKind::$kind;

            fn field(store: &Annotations) -> &Option<Self> {
                &store.$field
            }

            fn field_mut(store: &mut Annotations) -> &mut Option<Self> {
                &mut store.$field
            }
        }
    )*};
}

annotation_kinds!(
    ReachingDefinition => reaching as ReachingDefinition,
    ReachesSet => reaches as ReachesSet,
    JumpLabel => label as JumpLabel,
    Expression => expression as Expression,
);
