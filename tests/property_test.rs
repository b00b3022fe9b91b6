use dine_sync::domain::money::{Currency, MoneyAmount, within_tolerance};
use dine_sync::domain::order::{OrderStatus, OrderType};
use dine_sync::domain::payment::PaymentStatus;
use dine_sync::domain::refund::RefundStatus;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn arb_order_status() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(OrderStatus::ALL.to_vec())
}

fn arb_order_type() -> impl Strategy<Value = OrderType> {
    prop_oneof![
        Just(OrderType::DineIn),
        Just(OrderType::HomeDelivery),
        Just(OrderType::TakeAway),
    ]
}

fn arb_refund_status() -> impl Strategy<Value = RefundStatus> {
    prop::sample::select(RefundStatus::ALL.to_vec())
}

fn arb_payment_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Paid),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Refunded),
    ]
}

/// Two-decimal amounts up to 100 000.00.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    /// Terminal order statuses reject every transition.
    #[test]
    fn terminal_order_status_is_final(
        order_type in arb_order_type(),
        next in arb_order_status(),
    ) {
        for terminal in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            prop_assert!(!terminal.can_transition_to(order_type, next));
        }
    }

    /// A random walk along the lifecycle never moves backwards and never
    /// leaves the order type's path.
    #[test]
    fn order_walk_only_moves_forward(
        order_type in arb_order_type(),
        steps in prop::collection::vec(arb_order_status(), 1..30),
    ) {
        let path = order_type.status_path();
        let mut current = OrderStatus::OrderReceived;
        for next in steps {
            if !current.can_transition_to(order_type, next) {
                continue;
            }
            if next != OrderStatus::Cancelled {
                let from = path.iter().position(|s| *s == current).unwrap();
                let to = path.iter().position(|s| *s == next);
                prop_assert!(matches!(to, Some(to) if to > from), "{current} -> {next}");
            }
            current = next;
        }
    }

    /// Completed and cancelled refunds accept nothing further.
    #[test]
    fn terminal_refund_status_is_final(next in arb_refund_status()) {
        prop_assert!(!RefundStatus::Completed.can_transition_to(&next));
        prop_assert!(!RefundStatus::Cancelled.can_transition_to(&next));
    }

    /// Every non-terminal refund may be cancelled.
    #[test]
    fn open_refund_can_be_cancelled(status in arb_refund_status()) {
        prop_assert_eq!(
            status.can_transition_to(&RefundStatus::Cancelled),
            !status.is_terminal()
        );
    }

    /// A payment is reconciled at most once: at most two steps from pending
    /// (paid then refunded), and failed is final.
    #[test]
    fn payment_walk_is_short(steps in prop::collection::vec(arb_payment_status(), 1..20)) {
        let mut current = PaymentStatus::Pending;
        let mut transitions = 0u32;
        for next in &steps {
            if current.can_transition_to(next) {
                current = *next;
                transitions += 1;
            }
        }
        prop_assert!(transitions <= 2, "{transitions} transitions in {steps:?}");
        if transitions == 2 {
            prop_assert_eq!(current, PaymentStatus::Refunded);
        }
    }

    #[test]
    fn status_strings_parse_back(order in arb_order_status(), refund in arb_refund_status()) {
        prop_assert_eq!(OrderStatus::try_from(order.as_str()).unwrap(), order);
        prop_assert_eq!(RefundStatus::try_from(refund.as_str()).unwrap(), refund);
    }

    #[test]
    fn tolerance_is_symmetric(a in arb_amount(), b in arb_amount()) {
        prop_assert_eq!(within_tolerance(a, b), within_tolerance(b, a));
    }

    #[test]
    fn tolerance_accepts_one_hundredth(a in arb_amount()) {
        let cent = Decimal::new(1, 2);
        prop_assert!(within_tolerance(a, a + cent));
        prop_assert!(!within_tolerance(a, a + cent + cent));
    }

    /// Two-decimal major amounts convert to minor units exactly.
    #[test]
    fn from_major_is_exact_for_cents(cents in 0i64..10_000_000) {
        let minor = MoneyAmount::from_major(Decimal::new(cents, 2), Currency::Aed).unwrap();
        prop_assert_eq!(minor.minor(), cents);
    }

    #[test]
    fn negative_amounts_are_rejected(minor in i64::MIN..0) {
        prop_assert!(MoneyAmount::new(minor).is_err());
    }

    /// checked_add matches i64::checked_add and never silently overflows.
    #[test]
    fn money_add_never_silently_overflows(a in 0i64..=i64::MAX, b in 0i64..=i64::MAX) {
        let result = MoneyAmount::new(a).unwrap().checked_add(MoneyAmount::new(b).unwrap());
        match a.checked_add(b) {
            Some(expected) => prop_assert_eq!(result.unwrap().minor(), expected),
            None => prop_assert!(result.is_none()),
        }
    }
}
