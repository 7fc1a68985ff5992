//! Property-based tests for masks and the type lattice.

use ivmc_core::{Mask, Type};
use proptest::prelude::*;

fn any_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![
        Just(Type::Bottom),
        Just(Type::Top),
        Just(Type::Bool),
        Just(Type::Number),
        Just(Type::String),
        Just(Type::Tree),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Type::Tuple),
            inner.clone().prop_map(Type::set),
            (inner.clone(), inner).prop_map(|(k, v)| Type::map(k, v)),
        ]
    })
}

proptest! {
    /// Splitting by a mask and combining again restores the items.
    #[test]
    fn mask_split_combine_restores(bits in prop::collection::vec(any::<bool>(), 0..8)) {
        let mask = Mask::from_bools(bits.iter().copied());
        let items: Vec<usize> = (0..bits.len()).collect();
        let (bound, unbound) = mask.split(&items).unwrap();
        prop_assert_eq!(bound.len(), mask.count_bound());
        prop_assert_eq!(bound.len() + unbound.len(), mask.len());
        prop_assert_eq!(mask.combine(&bound, &unbound).unwrap(), items);
    }

    /// Exactly the masks with no bound position after an unbound one are key masks.
    #[test]
    fn mask_keymask_shape(bits in prop::collection::vec(any::<bool>(), 0..8)) {
        let mask = Mask::from_bools(bits.iter().copied());
        let ordered = bits.windows(2).all(|w| w[0] || !w[1]);
        prop_assert_eq!(mask.is_keymask(), ordered);
        if let Some((nb, nu)) = mask.break_keymask() {
            prop_assert_eq!(Mask::keymask(nb, nu), mask.clone());
            prop_assert_eq!(mask.is_mapmask(), nu == 1);
        }
    }

    /// Arity mismatches are rejected.
    #[test]
    fn mask_split_checks_arity(nb in 0usize..4, nu in 0usize..4, extra in 1usize..3) {
        let mask = Mask::keymask(nb, nu);
        let items = vec![0u8; nb + nu + extra];
        prop_assert!(mask.split(&items).is_err());
        prop_assert!(mask.combine(&items, &[]).is_err());
    }

    #[test]
    fn type_join_is_commutative(a in any_type(), b in any_type()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    /// The join bounds both operands, and Bottom and Top are the extremes.
    #[test]
    fn type_join_is_upper_bound(a in any_type(), b in any_type()) {
        let j = a.join(&b);
        prop_assert!(a.is_smaller(&j));
        prop_assert!(b.is_smaller(&j));
        prop_assert!(Type::Bottom.is_smaller(&a));
        prop_assert!(a.is_smaller(&Type::Top));
    }
}
