//! Algebraic properties of capture joins, inversion and simplification,
//! plus chunk constraint exclusivity.

use proptest::prelude::*;

use vulnsynth::graph::{ChunkConstraint, ChunkVariable, Expr, ExprKind};
use vulnsynth::interpret::{Capture, Lifter};
use vulnsynth::language::TypeNode;

#[derive(Clone, Copy, Debug)]
enum Layer {
    Ref,
    VRef,
    Deref,
    Index(u8),
}

fn variable(name: &str) -> Expr {
    Expr::variable(ChunkVariable::detached(name, Some(TypeNode::simple("int"))))
}

/// Builds a capture of `x`; the first layer is the outermost.
fn capture(layers: &[Layer]) -> Capture {
    let mut capture = Capture::Base(variable("x"));
    for layer in layers.iter().rev() {
        capture = match layer {
            Layer::Ref => Capture::Ref(Box::new(capture)),
            Layer::VRef => Capture::VRef(Box::new(capture)),
            Layer::Deref => Capture::Deref(Box::new(capture)),
            Layer::Index(index) => Capture::Array(Box::new(capture), Expr::value(index.to_string())),
        };
    }
    capture
}

fn arb_layer() -> impl Strategy<Value = Layer> {
    prop_oneof![
        Just(Layer::Ref),
        Just(Layer::VRef),
        Just(Layer::Deref),
        (0u8..3).prop_map(Layer::Index),
    ]
}

/// Pointer-only chains, the shapes inversion cancels exactly.
fn arb_pointer_layer() -> impl Strategy<Value = Layer> {
    prop_oneof![Just(Layer::Ref), Just(Layer::Deref)]
}

/// Shapes capturing can produce: only `[0]` accesses extend a chain.
fn arb_lvalue_layer() -> impl Strategy<Value = Layer> {
    prop_oneof![
        Just(Layer::Ref),
        Just(Layer::VRef),
        Just(Layer::Deref),
        Just(Layer::Index(0)),
    ]
}

fn arb_capture() -> impl Strategy<Value = Capture> {
    prop::collection::vec(arb_layer(), 0..6).prop_map(|layers| capture(&layers))
}

fn arb_pointer_capture() -> impl Strategy<Value = Capture> {
    prop::collection::vec(arb_pointer_layer(), 0..6).prop_map(|layers| capture(&layers))
}

fn arb_lvalue_capture() -> impl Strategy<Value = Capture> {
    prop::collection::vec(arb_lvalue_layer(), 0..6).prop_map(|layers| capture(&layers))
}

fn is_zero(index: &Expr) -> bool {
    matches!(&index.kind, ExprKind::Value(text) if text == "0")
}

/// The lvalue a capture denotes, with `e[0]` read as `*e` and address/deref
/// pairs cancelled.
fn denotation(capture: &Capture) -> Capture {
    match capture {
        Capture::Base(expr) => Capture::Base(expr.clone()),
        Capture::Ref(inner) => match denotation(inner) {
            Capture::Deref(target) => *target,
            other => Capture::Ref(Box::new(other)),
        },
        Capture::Deref(inner) => match denotation(inner) {
            Capture::Ref(target) => *target,
            other => Capture::Deref(Box::new(other)),
        },
        Capture::VRef(inner) => Capture::VRef(Box::new(denotation(inner))),
        Capture::Array(inner, index) if is_zero(index) => {
            denotation(&Capture::Deref(inner.clone()))
        }
        Capture::Array(inner, index) => Capture::Array(Box::new(denotation(inner)), index.clone()),
    }
}

fn is_variable(expr: &Expr, name: &str) -> bool {
    matches!(&expr.kind, ExprKind::Variable(var) if var.name == name)
}

proptest! {
    #[test]
    fn simplify_is_idempotent(c in arb_capture()) {
        let once = c.simplify();
        prop_assert!(once.simplify().same_shape(&once), "{} -> {}", c, once);
    }

    #[test]
    fn inverse_applied_to_capture_cancels(c in arb_pointer_capture()) {
        let hole = variable("p");
        let rebuilt = c.replace(&c.invert(hole.clone())).simplify();
        prop_assert!(rebuilt.same_shape(&Capture::Base(hole)), "{} -> {}", c, rebuilt);
    }

    #[test]
    fn capture_applied_to_inverse_cancels(c in arb_pointer_capture()) {
        let rebuilt = c.invert(variable("p")).replace(&c).simplify();
        prop_assert!(rebuilt.same_shape(&Capture::Base(variable("x"))), "{} -> {}", c, rebuilt);
    }

    #[test]
    fn join_is_symmetric(a in arb_capture(), b in arb_capture()) {
        let left = a.maximal(&b).expect("same variable");
        let right = b.maximal(&a).expect("same variable");
        prop_assert!(left.same_shape(&right), "{} vs {}", left, right);
    }

    #[test]
    fn every_usage_rewrites_through_the_maximal(
        usages in prop::collection::vec(arb_capture(), 1..5)
    ) {
        let mut maximal = usages[0].clone();
        for usage in &usages[1..] {
            maximal = maximal.maximal(usage).expect("same variable");
        }
        for usage in &usages {
            let rewritten = Lifter::rewrite(usage, &maximal, variable("p"));
            prop_assert!(is_variable(rewritten.base(), "p"), "{} via {}", usage, maximal);
        }
    }

    #[test]
    fn rewritten_usages_denote_the_original_lvalue(
        usages in prop::collection::vec(arb_lvalue_capture(), 1..5)
    ) {
        let mut maximal = usages[0].clone();
        for usage in &usages[1..] {
            maximal = maximal.maximal(usage).expect("same variable");
        }
        let argument = maximal.to_argument();
        for usage in &usages {
            let rewritten = Lifter::rewrite(usage, &maximal, variable("p"));
            let restored = denotation(&rewritten.replace(&argument));
            prop_assert!(
                restored.same_shape(&denotation(usage)),
                "{} via {} restores {}", usage, maximal, restored
            );
        }
    }

    #[test]
    fn pointer_maximal_absorbs_its_usages(
        usages in prop::collection::vec(arb_pointer_capture(), 1..5)
    ) {
        let mut maximal = usages[0].clone();
        for usage in &usages[1..] {
            maximal = maximal.maximal(usage).expect("same variable");
        }
        for usage in &usages {
            let again = maximal.maximal(usage).expect("same variable");
            prop_assert!(again.same_shape(&maximal), "{} absorbs {} into {}", maximal, usage, again);
        }
    }

    #[test]
    fn local_and_global_never_combine(
        local in any::<bool>(),
        global in any::<bool>(),
        is_static in any::<bool>(),
        other in (any::<bool>(), any::<bool>(), any::<bool>()),
    ) {
        let built = ChunkConstraint::new(local, global, is_static);
        prop_assert_eq!(built.is_err(), local && global);
        let Ok(built) = built else {
            return Ok(());
        };
        let Ok(other_constraint) = ChunkConstraint::new(other.0, other.1, other.2) else {
            return Ok(());
        };
        let merged = built.merge(&other_constraint);
        let conflict = (local || other.0) && (global || other.1);
        prop_assert_eq!(merged.is_err(), conflict);
        if let Ok(merged) = merged {
            prop_assert_eq!(merged.is_static(), is_static || other.2);
        }
    }
}

#[test]
fn captures_of_different_variables_do_not_join() {
    let x = Capture::Base(variable("x"));
    let y = Capture::Ref(Box::new(Capture::Base(variable("y"))));
    assert!(x.maximal(&y).is_err());
}
