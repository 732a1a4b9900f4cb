use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mure::ast::{
    AttributeDef, Command, Expr, MessageDef, ModelDef, Pattern, Span, SpeciesDef, StateDef,
    StepDef, TransitionDef,
};
use mure::{CompileError, ModelCompiler, ValueType};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn span() -> Span {
    Span::new(1, 1)
}

fn idle_state(name: &str, is_initial: bool) -> StateDef {
    StateDef {
        name: name.to_string(),
        is_initial,
        sojourn: None,
        step: StepDef::None,
        handlers: Vec::new(),
        dynamics: vec![],
        span: span(),
    }
}

fn looping_state(name: &str, command: Command) -> StateDef {
    StateDef {
        name: name.to_string(),
        is_initial: true,
        sojourn: Some(Expr::Real(1.0)),
        step: StepDef::Deterministic(TransitionDef {
            command,
            next: name.to_string(),
            span: span(),
        }),
        handlers: Vec::new(),
        dynamics: vec![],
        span: span(),
    }
}

fn single_species(states: Vec<StateDef>) -> ModelDef {
    ModelDef {
        species: vec![SpeciesDef {
            name: "walker".to_string(),
            states,
            span: span(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn test_species_without_initial_state_is_rejected() {
    let model = single_species(vec![idle_state("a", false), idle_state("b", false)]);
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::MissingInitialState { .. })));
}

#[test]
fn test_species_with_two_initial_states_is_rejected() {
    let model = single_species(vec![idle_state("a", true), idle_state("b", true)]);
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::DuplicateInitialState { .. })));
}

#[test]
fn test_species_with_one_initial_state_compiles() {
    let model = single_species(vec![idle_state("a", true), idle_state("b", false)]);
    let compiled = ModelCompiler::compile(&model).unwrap();
    let prototype = compiled.definitions().prototype("walker").unwrap();
    assert_eq!(&**prototype.behaviour().initial_state().name(), "a");
}

#[test]
fn test_unknown_target_state_is_rejected_not_defaulted() {
    let model = single_species(vec![StateDef {
        name: "a".to_string(),
        is_initial: true,
        sojourn: Some(Expr::Real(1.0)),
        step: StepDef::Deterministic(TransitionDef {
            command: Command::Skip,
            next: "nowhere".to_string(),
            span: span(),
        }),
        handlers: Vec::new(),
        dynamics: vec![],
        span: span(),
    }]);
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::UnknownState { .. })));
}

#[test]
fn test_send_arity_invariant_over_arities() {
    // タグの宣言アリティ 0..=3 それぞれについて、要素数の過不足を拒否する
    for arity in 0usize..=3 {
        let payload = vec![ValueType::Integer; arity];
        let good_args = vec![Expr::Integer(1); arity];
        let bad_args = vec![Expr::Integer(1); arity + 1];

        let build = |args: Vec<Expr>| ModelDef {
            messages: vec![MessageDef {
                name: "note".to_string(),
                payload: payload.clone(),
                span: span(),
            }],
            species: vec![SpeciesDef {
                name: "walker".to_string(),
                states: vec![looping_state(
                    "a",
                    Command::Send {
                        tag: "note".to_string(),
                        args,
                        target: None,
                        delay: Expr::Real(0.0),
                        span: span(),
                    },
                )],
                span: span(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(
            ModelCompiler::compile(&build(good_args)).is_ok(),
            "arity {} should compile",
            arity
        );
        let errors = ModelCompiler::compile(&build(bad_args)).unwrap_err();
        assert!(
            errors.errors.iter().any(|e| matches!(
                e,
                CompileError::ArityMismatch {
                    expected,
                    actual,
                    ..
                } if *expected == arity && *actual == arity + 1
            )),
            "arity {} mismatch should be rejected",
            arity
        );
    }
}

#[test]
fn test_randomness_is_forbidden_in_attribute_initializers() {
    let model = ModelDef {
        species: vec![SpeciesDef {
            name: "walker".to_string(),
            attributes: vec![AttributeDef {
                name: "x".to_string(),
                value_type: ValueType::Real,
                expr: Expr::Random(span()),
                span: span(),
            }],
            states: vec![idle_state("a", true)],
            span: span(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::IllegalCapability { construct: "random()", .. })));
}

#[test]
fn test_aggregates_are_forbidden_in_commands() {
    let model = ModelDef {
        species: vec![SpeciesDef {
            name: "walker".to_string(),
            attributes: vec![AttributeDef {
                name: "x".to_string(),
                value_type: ValueType::Integer,
                expr: Expr::Integer(0),
                span: span(),
            }],
            states: vec![looping_state(
                "a",
                Command::Assign {
                    name: "x".to_string(),
                    expr: Expr::Aggregate {
                        op: mure::ast::AggregateOp::Count,
                        expr: None,
                        pattern: Pattern::Any(span()),
                        span: span(),
                    },
                    span: span(),
                },
            )],
            span: span(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::IllegalCapability { .. })));
}

#[test]
fn test_compilation_aggregates_errors_across_declarations() {
    // 1 つのモデルに複数の独立した誤りを仕込み、一度の走査で全部報告される
    let model = ModelDef {
        species: vec![
            SpeciesDef {
                name: "first".to_string(),
                states: vec![StateDef {
                    name: "a".to_string(),
                    is_initial: true,
                    sojourn: Some(Expr::Real(1.0)),
                    step: StepDef::Deterministic(TransitionDef {
                        command: Command::Send {
                            tag: "missing".to_string(),
                            args: vec![],
                            target: None,
                            delay: Expr::Real(0.0),
                            span: span(),
                        },
                        next: "a".to_string(),
                        span: span(),
                    }),
                    handlers: Vec::new(),
                    dynamics: vec![],
                    span: span(),
                }],
                span: span(),
                ..Default::default()
            },
            SpeciesDef {
                name: "second".to_string(),
                states: vec![idle_state("x", false)],
                span: span(),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::UnknownTag { .. })));
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::MissingInitialState { .. })));
    assert!(errors.errors.len() >= 2);
}

#[test]
fn test_incomparable_relation_names_both_types() {
    let model = single_species(vec![StateDef {
        name: "a".to_string(),
        is_initial: true,
        sojourn: Some(Expr::Real(1.0)),
        step: StepDef::Deterministic(TransitionDef {
            command: Command::IfThenElse {
                guard: Expr::Relation {
                    op: mure::ast::RelationOp::Lt,
                    left: Box::new(Expr::True),
                    right: Box::new(Expr::Integer(0)),
                    span: span(),
                },
                then_branch: Box::new(Command::Skip),
                else_branch: None,
                span: span(),
            },
            next: "a".to_string(),
            span: span(),
        }),
        handlers: Vec::new(),
        dynamics: vec![],
        span: span(),
    }]);
    let errors = ModelCompiler::compile(&model).unwrap_err();
    let rendered = errors.to_string();
    assert!(rendered.contains("Boolean"));
    assert!(rendered.contains("Integer"));
}

#[test]
fn test_constants_fold_and_duplicate_names_are_reported() {
    let model = ModelDef {
        constants: vec![
            mure::ast::ConstDef {
                name: "rate".to_string(),
                expr: Expr::Real(2.0),
                span: span(),
            },
            mure::ast::ConstDef {
                name: "rate".to_string(),
                expr: Expr::Real(3.0),
                span: span(),
            },
        ],
        ..Default::default()
    };
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors
        .errors
        .iter()
        .any(|e| matches!(e, CompileError::DuplicateName { .. })));
}

#[test]
fn test_handler_capture_arity_is_checked() {
    let model = ModelDef {
        messages: vec![MessageDef {
            name: "hit".to_string(),
            payload: vec![ValueType::Integer, ValueType::Integer],
            span: span(),
        }],
        species: vec![SpeciesDef {
            name: "walker".to_string(),
            states: vec![StateDef {
                name: "a".to_string(),
                is_initial: true,
                sojourn: None,
                step: StepDef::None,
                handlers: vec![mure::ast::HandlerDef {
                    tag: "hit".to_string(),
                    captures: vec!["only_one".to_string()],
                    sender: None,
                    guard: None,
                    transition: TransitionDef {
                        command: Command::Skip,
                        next: "a".to_string(),
                        span: span(),
                    },
                    span: span(),
                }],
                dynamics: vec![],
                span: span(),
            }],
            span: span(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let errors = ModelCompiler::compile(&model).unwrap_err();
    assert!(errors.errors.iter().any(|e| matches!(
        e,
        CompileError::CaptureArityMismatch {
            expected: 2,
            actual: 1,
            ..
        }
    )));
}
