//! End-to-end behaviour of ensembles through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ensemble_dispatch::{
    EnsembleError, EnsembleManager, HandlerVariant, Invocation, Lookup, ManagerConfig, PartSpec,
    SimpleFnHandler,
};

// ============================================================================
// Test helpers
// ============================================================================

/// Handler echoing the words it was called with, joined by `|`.
fn echo() -> HandlerVariant {
    HandlerVariant::from_fn(|_m: &mut EnsembleManager, call: &Invocation| {
        Ok::<_, EnsembleError>(call.words.join("|"))
    })
}

fn info_session() -> EnsembleManager {
    let mut m = EnsembleManager::new();
    let info = m.create_ensemble("info").unwrap();
    m.add_part(info, PartSpec::new("args", echo()).usage("procname"))
        .unwrap();
    m.add_part(info, PartSpec::new("body", echo()).usage("procname"))
        .unwrap();
    m
}

// ============================================================================
// Abbreviation
// ============================================================================

#[test]
fn configure_and_cget_in_either_order() {
    for order in [["configure", "cget"], ["cget", "configure"]] {
        let mut m = EnsembleManager::new();
        let obj = m.create_ensemble("obj").unwrap();
        for name in order {
            m.add_part(obj, PartSpec::new(name, echo())).unwrap();
        }

        match m.find_part(obj, "c").unwrap() {
            Lookup::Ambiguous(candidates) => {
                let names: Vec<&str> = candidates.iter().map(|e| e.name()).collect();
                assert_eq!(names, vec!["cget", "configure"]);
            }
            other => panic!("expected ambiguity, got {:?}", other.found_name()),
        }
        assert_eq!(m.find_part(obj, "co").unwrap().found_name(), Some("configure"));
        assert_eq!(m.find_part(obj, "config").unwrap().found_name(), Some("configure"));
        assert_eq!(m.find_part(obj, "cg").unwrap().found_name(), Some("cget"));
        assert!(m.find_part(obj, "g").unwrap().is_not_found());
    }
}

#[test]
fn empty_token_is_unknown() {
    let mut m = info_session();
    let err = m.eval(&["info", ""]).unwrap_err();
    assert!(matches!(err, EnsembleError::UnknownPart { .. }));
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_a_usage_has_one_line_per_part() {
    let m = info_session();
    let usage = m.get_usage("info").unwrap();
    assert_eq!(usage, "info args procname\ninfo body procname");
    // Unchanged ensemble, unchanged text.
    assert_eq!(m.get_usage("info").unwrap(), usage);
}

#[test]
fn scenario_b_exact_name_beats_ambiguity() {
    let mut m = info_session();
    let info = m.find_ensemble("info").unwrap();
    m.add_part(info, PartSpec::new("argument", echo())).unwrap();

    assert!(m.find_part(info, "arg").unwrap().is_ambiguous());
    assert_eq!(m.find_part(info, "args").unwrap().found_name(), Some("args"));
    assert_eq!(
        m.find_part(info, "argument").unwrap().found_name(),
        Some("argument")
    );
    assert_eq!(m.eval(&["info", "args", "p"]).unwrap(), "args|p");
    assert_eq!(m.eval(&["info", "argu", "p"]).unwrap(), "argument|p");

    let err = m.eval(&["info", "arg"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "ambiguous option \"arg\": should be one of...\n  info args procname\n  info argument"
    );
}

#[test]
fn scenario_c_deleting_owner_part_strands_sub_ensemble() {
    let mut m = info_session();
    let info = m.find_ensemble("info").unwrap();
    let sub = m.create_ensemble_path(&["info", "frame"]).unwrap();
    m.add_part(sub, PartSpec::new("get", echo())).unwrap();
    assert_eq!(m.eval(&["info", "f", "g", "1"]).unwrap(), "get|1");

    m.delete_part(info, "frame").unwrap();

    let err = m.find_part(sub, "get").unwrap_err();
    assert!(matches!(err, EnsembleError::NotAnEnsemble(_)));
    assert!(err.to_string().contains("is not an ensemble"));
    assert!(m.eval(&["info", "f", "g"]).is_err());
    assert!(m.find_ensemble("info frame").is_none());
}

#[test]
fn scenario_d_definition_block_builds_two_levels() {
    let mut m = EnsembleManager::new();
    m.define("ensemble outer { part a {} {}; ensemble inner { part b {} {} } }")
        .unwrap();
    let outer = m.find_ensemble("outer").unwrap();

    let inner = match m.find_part(outer, "inner").unwrap() {
        Lookup::Found(entry) => entry.value.sub_ensemble().unwrap(),
        _ => panic!("inner not found"),
    };
    assert_eq!(m.find_part(inner, "b").unwrap().found_name(), Some("b"));
    assert_eq!(
        m.get_usage("outer").unwrap(),
        "outer a\nouter inner option ?arg arg ...?"
    );
}

// ============================================================================
// Error part
// ============================================================================

#[test]
fn error_part_takes_over_unknown_subcommands() {
    let mut m = EnsembleManager::new();
    m.define(
        r#"
        ensemble widget {
            part configure {args} { return configured $args }
            part @error {token} { return no such method $token }
        }
        "#,
    )
    .unwrap();

    assert_eq!(
        m.eval(&["widget", "frobnicate", "x"]).unwrap(),
        "no such method frobnicate"
    );
    assert_eq!(m.eval(&["widget", "c", "-bg", "red"]).unwrap(), "configured -bg red");
    assert_eq!(
        m.get_usage("widget").unwrap(),
        "widget configure ?arg arg ...?\n...and others described elsewhere"
    );
}

#[test]
fn custom_error_part_name() {
    let mut m = EnsembleManager::with_config(ManagerConfig {
        error_part: "unknown".into(),
        ..Default::default()
    });
    let obj = m.create_ensemble("obj").unwrap();
    m.add_part(obj, PartSpec::new("unknown", echo())).unwrap();
    assert_eq!(m.eval(&["obj", "zzz"]).unwrap(), "obj|unknown|zzz");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn delete_callbacks_run_once_per_part_on_cascade() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut m = EnsembleManager::new();
    let top = m.create_ensemble("top").unwrap();
    let mid = m.create_ensemble("top mid").unwrap();
    let leaf = m.create_ensemble("top mid leaf").unwrap();
    for (id, name) in [(top, "t"), (mid, "m"), (leaf, "l")] {
        let log = log.clone();
        m.add_part(
            id,
            PartSpec::new(name, echo()).on_delete(move || log.borrow_mut().push(name)),
        )
        .unwrap();
    }

    m.delete_ensembles(&["top"]).unwrap();
    let mut seen = log.borrow().clone();
    seen.sort();
    assert_eq!(seen, vec!["l", "m", "t"]);
    assert_eq!(m.ensemble_count(), 0);
}

#[test]
fn delete_ensembles_reports_non_ensemble() {
    let mut m = info_session();
    let err = m.delete_ensembles(&["nope"]).unwrap_err();
    assert_eq!(err.to_string(), "\"nope\" is not an ensemble");
    assert!(m.is_ensemble("info"));
}

#[test]
fn add_part_by_name_with_callback() {
    let deleted = Rc::new(Cell::new(false));
    let mut m = info_session();
    let flag = deleted.clone();
    m.add_part_by_name(
        "info",
        "level",
        "?number?",
        HandlerVariant::native(SimpleFnHandler::new(|params: &[String]| {
            Ok::<_, EnsembleError>(params.len().to_string())
        })),
        Some(Box::new(move || flag.set(true))),
    )
    .unwrap();

    assert_eq!(m.eval(&["info", "l", "a", "b"]).unwrap(), "2");
    m.delete_part_by_name("info", "level").unwrap();
    assert!(deleted.get());
    assert!(m.delete_part_by_name("info", "level").is_err());
}

#[test]
fn sessions_are_independent() {
    let a = info_session();
    let b = EnsembleManager::new();
    assert!(a.is_ensemble("info"));
    assert!(!b.is_ensemble("info"));
}

// ============================================================================
// Reentrancy
// ============================================================================

#[test]
fn script_parts_dispatch_through_the_session() {
    let mut m = EnsembleManager::new();
    m.define(
        r#"
        ensemble str {
            part upper {s} { return [$s] }
            part twice {s} {
                # calls back into the same ensemble
                str upper $s
            }
        }
        "#,
    )
    .unwrap();
    assert_eq!(m.eval(&["str", "tw", "x"]).unwrap(), "[x]");
}

#[test]
fn runaway_recursion_is_bounded() {
    let mut m = EnsembleManager::with_config(ManagerConfig {
        max_nesting_depth: 50,
        ..Default::default()
    });
    m.define("ensemble spin { part go {} { spin go } }").unwrap();
    let err = m.eval(&["spin", "go"]).unwrap_err();
    assert_eq!(err.to_string(), "too many nested evaluations (infinite loop?)");

    // The session is still usable afterwards.
    m.define("ensemble ok { part go {} { return fine } }").unwrap();
    assert_eq!(m.eval(&["ok", "go"]).unwrap(), "fine");
}

#[test]
fn default_depth_limit_fits_a_spawned_thread_stack() {
    // Spawned threads get 2 MiB by default, unlike the main test thread.
    let message = std::thread::spawn(|| {
        let mut m = EnsembleManager::new();
        m.define("ensemble spin { part go {} { spin go } }").unwrap();
        m.eval(&["spin", "go"]).unwrap_err().to_string()
    })
    .join()
    .unwrap();
    assert_eq!(message, "too many nested evaluations (infinite loop?)");
}

#[test]
fn wrong_arity_for_script_part() {
    let mut m = EnsembleManager::new();
    m.define("ensemble info { part args {procname {level 0}} { return $procname } }")
        .unwrap();
    let err = m.eval(&["info", "args"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "wrong # args: should be \"info args procname ?level?\""
    );
    let err = m.eval(&["info", "args", "a", "b", "c"]).unwrap_err();
    assert!(matches!(err, EnsembleError::WrongProcArgs { .. }));
}

#[test]
fn host_state_is_visible_to_handlers() {
    struct Counter(Cell<u32>);

    let mut m = EnsembleManager::new();
    m.host_state_mut().insert(Counter(Cell::new(0)));
    let obj = m.create_ensemble("count").unwrap();
    m.add_part(
        obj,
        PartSpec::new(
            "bump",
            HandlerVariant::from_fn(|m: &mut EnsembleManager, _c: &Invocation| {
                let counter = m.host_state().get_required::<Counter>()?;
                counter.0.set(counter.0.get() + 1);
                Ok::<_, EnsembleError>(counter.0.get().to_string())
            }),
        ),
    )
    .unwrap();

    m.eval(&["count", "bump"]).unwrap();
    assert_eq!(m.eval(&["count", "b"]).unwrap(), "2");

    let mut bare = EnsembleManager::new();
    assert!(bare.host_state().get_required::<Counter>().is_err());
    bare.host_state_mut().insert(Counter(Cell::new(5)));
    assert_eq!(bare.host_state().get::<Counter>().unwrap().0.get(), 5);
}
