//! Caller-supplied key partitions.
//!
//! A partition groups keys into classes a caller treats as equivalent.
//! Extraction over a class draws uniformly from the union of the class
//! members' buckets. The default partition puts every key in its own class.

use crate::context::{complement, FragmentType, IdContext, SbsContext};

/// A partition of a key type into finite classes.
///
/// `class_of` returns every key in the class of `key`, `key` included, in a
/// canonical order. The same key must always yield the same list.
pub trait KeyPartition<K> {
    fn class_of(key: &K) -> Vec<K>;
}

/// The trivial partition: every key is alone in its class.
pub struct Singleton;

impl<K: Clone> KeyPartition<K> for Singleton {
    fn class_of(key: &K) -> Vec<K> {
        vec![key.clone()]
    }
}

/// Indel contexts: a homopolymer pairs with the homopolymer of the
/// complementary base (a run of `A`s on one strand is a run of `T`s on the
/// other); heteropolymers and microhomologies stand alone.
pub struct IdContextClasses;

impl KeyPartition<IdContext> for IdContextClasses {
    fn class_of(context: &IdContext) -> Vec<IdContext> {
        match (context.fragment_type(), context.unit_base()) {
            (FragmentType::Homopolymer, Some(base)) => {
                let reps = context.num_of_repetitions().unwrap_or(0);
                vec![
                    *context,
                    IdContext::for_homopolymer(complement(base), reps),
                ]
            }
            _ => vec![*context],
        }
    }
}

/// SBS contexts: a trinucleotide pairs with its reverse complement, the
/// same context read on the opposite strand.
pub struct SbsContextClasses;

impl KeyPartition<SbsContext> for SbsContextClasses {
    fn class_of(context: &SbsContext) -> Vec<SbsContext> {
        vec![*context, context.reverse_complement()]
    }
}
