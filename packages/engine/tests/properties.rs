use std::cell::{Cell, RefCell};
use std::rc::Rc;

use scopewatch_engine::{CallbackResult, Engine, Event, ScopeId, TickOutcome, Value, WatchSource};
use scopewatch_value::key_path;

/// Check the watcher count of every node in the subtree against its own
/// watches plus its children's counts.
fn assert_counts_consistent(engine: &Engine, scope: ScopeId) -> usize {
    let children: usize = engine
        .children(scope)
        .to_vec()
        .into_iter()
        .map(|child| assert_counts_consistent(engine, child))
        .sum();
    let expected = engine.own_watch_count(scope) + children;
    assert_eq!(engine.watcher_count(scope), expected, "count mismatch at {scope}");
    expected
}

#[test]
fn test_watcher_counts_stay_consistent() {
    let mut engine = Engine::default();
    let root = engine.create_root();
    let a = engine.new_child(root).unwrap();
    let b = engine.new_isolated(root).unwrap();
    let a1 = engine.new_child(a).unwrap();
    let a2 = engine.new_child(a).unwrap();
    let b1 = engine.reparent(a, Some(b)).unwrap();

    let mut handles = Vec::new();
    for (i, scope) in [root, a, b, a1, a2, b1, a1, b1].into_iter().enumerate() {
        handles.push(engine.watch(scope, key_path!("x"), |_, _| Ok(())));
        if i % 3 == 0 {
            engine.tick();
        }
        assert_counts_consistent(&engine, root);
    }

    for handle in handles.iter().step_by(2) {
        engine.unwatch(*handle);
        assert_counts_consistent(&engine, root);
    }

    engine.destroy(a2);
    assert_counts_consistent(&engine, root);
    engine.destroy(b);
    assert_counts_consistent(&engine, root);
    assert_counts_consistent(&engine, b1);
}

#[test]
fn test_double_deregistration_leaves_other_watches_alone() {
    let mut engine = Engine::default();
    let root = engine.create_root();
    let child = engine.new_child(root).unwrap();
    let first = engine.watch(child, key_path!("a"), |_, _| Ok(()));
    let second = engine.watch(child, key_path!("a"), |_, _| Ok(()));

    assert!(engine.unwatch(first));
    assert!(!engine.unwatch(first));
    assert!(!engine.unwatch(first));

    assert_eq!(engine.watcher_count(root), 1);
    assert_eq!(engine.own_watch_count(child), 1);
    assert!(engine.unwatch(second));
    assert_eq!(engine.watcher_count(root), 0);
}

#[test]
fn test_child_write_shadows_without_touching_parent() {
    let mut engine = Engine::default();
    let parent = engine.create_root();
    let child = engine.new_child(parent).unwrap();
    engine.set(parent, "x", 1);
    assert_eq!(engine.get(child, "x"), Value::from(1));

    engine.set(child, "x", 5);
    assert_eq!(engine.get(parent, "x"), Value::from(1));
    assert_eq!(engine.get(child, "x"), Value::from(5));

    engine.remove(child, "x");
    assert_eq!(engine.get(child, "x"), Value::from(1));
}

#[test]
fn test_alternating_nan_producers_settle() {
    let mut engine = Engine::default();
    let root = engine.create_root();
    let flip = Rc::new(Cell::new(false));
    let toggle = flip.clone();
    let getter = WatchSource::getter(move |_| {
        toggle.set(!toggle.get());
        if toggle.get() {
            Value::Number(f64::NAN)
        } else {
            Value::Number(f64::INFINITY - f64::INFINITY)
        }
    });

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    engine.watch(root, getter, move |_, _| {
        seen.set(seen.get() + 1);
        Ok(())
    });

    assert!(matches!(engine.tick(), TickOutcome::Settled { .. }));
    engine.digest(root);
    engine.digest(root);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_emit_from_leaf_with_stop_at_mid() {
    let mut engine = Engine::default();
    let root = engine.create_root();
    let mid = engine.new_child(root).unwrap();
    let leaf = engine.new_child(mid).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = |order: &Rc<RefCell<Vec<&'static str>>>, name: &'static str, stop: bool| {
        let order = order.clone();
        move |_: &mut Engine, event: &mut Event, _: &[Value]| -> CallbackResult {
            order.borrow_mut().push(name);
            if stop {
                event.stop_propagation();
            }
            Ok(())
        }
    };
    engine.on(leaf, "ping", log(&order, "leaf", false));
    engine.on(mid, "ping", log(&order, "mid", false));
    engine.on(root, "ping", log(&order, "root", false));

    engine.emit(leaf, "ping", &[]);
    assert_eq!(*order.borrow(), vec!["leaf", "mid", "root"]);

    order.borrow_mut().clear();
    engine.on(mid, "ping", log(&order, "mid-stop", true));
    engine.on(mid, "ping", log(&order, "mid-after", false));
    let event = engine.emit(leaf, "ping", &[]);

    assert!(event.propagation_stopped());
    assert_eq!(*order.borrow(), vec!["leaf", "mid", "mid-stop", "mid-after"]);
}

#[test]
fn test_post_convergence_tasks_drain_in_order() {
    let mut engine = Engine::default();
    let root = engine.create_root();
    let order = Rc::new(RefCell::new(Vec::new()));

    let sink = order.clone();
    engine.watch(root, key_path!("ready"), move |engine, change| {
        if change.new_value.as_bool() != Some(true) {
            return Ok(());
        }
        for name in ["A", "B", "C"] {
            let sink = sink.clone();
            engine.enqueue_post_convergence(move |engine| {
                sink.borrow_mut().push(name);
                if name == "A" {
                    let sink = sink.clone();
                    engine.enqueue_post_convergence(move |_| {
                        sink.borrow_mut().push("D");
                        Ok(())
                    });
                }
                Ok(())
            });
        }
        Ok(())
    });
    engine.tick();

    engine.set(root, "ready", true);
    engine.tick();
    assert_eq!(*order.borrow(), vec!["A", "B", "C", "D"]);
    assert_eq!(engine.post_convergence_len(), 0);
}
