use core::fmt;

use crate::values::ValueType;

// Parsed model fragments.
//
// The surface grammar and tokenizer live outside this crate; an external
// parser hands over these trees and the compiler never touches source
// text. Every node that can fail compilation carries the span the parser
// recorded for it, so diagnostics can point back into the model file.

/// Position of a fragment in the original model source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// Root AST Definition
#[derive(Debug, Clone, Default)]
pub struct ModelDef {
    pub constants: Vec<ConstDef>,
    pub parameters: Vec<ParamDef>,
    pub messages: Vec<MessageDef>,
    pub species: Vec<SpeciesDef>,
    pub measures: Vec<MeasureDef>,
    pub predicates: Vec<PredicateDef>,
}

/// A named constant, evaluated once during compilation.
#[derive(Debug, Clone)]
pub struct ConstDef {
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

/// A model parameter: like a constant, but overridable per configuration.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

/// A message tag declaration; arity is the length of `payload`.
#[derive(Debug, Clone)]
pub struct MessageDef {
    pub name: String,
    pub payload: Vec<ValueType>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MeasureDef {
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct PredicateDef {
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

// エージェント種別のトップレベル構造
#[derive(Debug, Clone, Default)]
pub struct SpeciesDef {
    pub name: String,
    pub params: Vec<(String, ValueType)>,
    /// Attribute initializers, evaluated from the argument values when an
    /// agent is instantiated.
    pub attributes: Vec<AttributeDef>,
    /// View attributes, recomputed from the population snapshot by the
    /// perception step.
    pub views: Vec<AttributeDef>,
    /// Continuous dynamics: per-attribute update expressions applied as a
    /// function of elapsed `dt` whenever local time advances.
    pub time_updates: Vec<AttributeDef>,
    pub states: Vec<StateDef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: String,
    pub value_type: ValueType,
    pub expr: Expr,
    pub span: Span,
}

/// One behavioural state of a species.
#[derive(Debug, Clone)]
pub struct StateDef {
    pub name: String,
    pub is_initial: bool,
    /// Sojourn-time expression; `None` for states that only react to
    /// messages and never fire a timed step.
    pub sojourn: Option<Expr>,
    pub step: StepDef,
    pub handlers: Vec<HandlerDef>,
    /// State-specific continuous dynamics, applied after the species
    /// time update over the same interval.
    pub dynamics: Vec<AttributeDef>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub enum StepDef {
    /// The state never fires a timed step.
    #[default]
    None,
    /// Always the same transition.
    Deterministic(TransitionDef),
    /// Guarded, weighted alternatives; declaration order is the observable
    /// tie-break of the runtime selection.
    Probabilistic(Vec<CaseDef>),
}

#[derive(Debug, Clone)]
pub struct TransitionDef {
    pub command: Command,
    pub next: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CaseDef {
    pub guard: Option<Expr>,
    pub weight: Expr,
    pub transition: TransitionDef,
}

/// A message handler attached to a state.
#[derive(Debug, Clone)]
pub struct HandlerDef {
    pub tag: String,
    /// Names binding the message content, positionally, for the guard and
    /// body; length must equal the tag's declared arity.
    pub captures: Vec<String>,
    pub sender: Option<Pattern>,
    pub guard: Option<Expr>,
    pub transition: TransitionDef,
    pub span: Span,
}

// 式
#[derive(Debug, Clone)]
pub enum Expr {
    True,
    False,
    Integer(i64),
    Real(f64),
    /// A named reference: parameter, constant, attribute or view.
    Reference(String, Span),
    /// `it.name`: an attribute of the matched pattern element.
    PatternReference(String, Span),
    Now(Span),
    Dt(Span),
    /// `random()`: a uniform draw in [0, 1).
    Random(Span),
    SampleUniform {
        from: Box<Expr>,
        to: Box<Expr>,
        span: Span,
    },
    SampleNormal {
        mean: Box<Expr>,
        sigma: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Relation {
        op: RelationOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    IfThenElse {
        guard: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
    /// A builtin function application, e.g. `sin(x)` or `atan2(y, x)`.
    Call {
        function: Builtin,
        args: Vec<Expr>,
        span: Span,
    },
    Cast {
        target: ValueType,
        arg: Box<Expr>,
        span: Span,
    },
    /// A population aggregate over agents matching a pattern.
    Aggregate {
        op: AggregateOp,
        /// Scalar evaluated per matching agent; absent for count/exists/forall.
        expr: Option<Box<Expr>>,
        pattern: Box<Pattern>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::True | Expr::False | Expr::Integer(_) | Expr::Real(_) => Span::default(),
            Expr::Reference(_, span)
            | Expr::PatternReference(_, span)
            | Expr::Now(span)
            | Expr::Dt(span)
            | Expr::Random(span)
            | Expr::SampleUniform { span, .. }
            | Expr::SampleNormal { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Relation { span, .. }
            | Expr::IfThenElse { span, .. }
            | Expr::Call { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Aggregate { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    /// Zero-preserving division.
    #[strum(serialize = "//")]
    ZeroDiv,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "^")]
    Pow,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "|")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RelationOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Neq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Leq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Geq,
}

impl RelationOp {
    /// Ordering relations require numeric operands; (in)equality also
    /// accepts boolean pairs.
    pub fn is_ordering(self) -> bool {
        !matches!(self, RelationOp::Eq | RelationOp::Neq)
    }
}

/// Scalar builtins; applications are arity-checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Abs,
    Floor,
    Ceil,
    Exp,
    Log,
    Log10,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Atan2,
    Min,
    Max,
    Pow,
}

impl Builtin {
    pub fn arity(self) -> usize {
        match self {
            Builtin::Atan2 | Builtin::Min | Builtin::Max | Builtin::Pow => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Mean,
    Exists,
    ForAll,
}

impl AggregateOp {
    /// Aggregates that fold a per-agent scalar, as opposed to the purely
    /// pattern-driven count/exists/forall.
    pub fn takes_expression(self) -> bool {
        matches!(
            self,
            AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max | AggregateOp::Mean
        )
    }
}

// エージェント選択パターン
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches every agent.
    Any(Span),
    /// Species-name guard plus a boolean guard over the candidate.
    Named {
        species: String,
        guard: Expr,
        span: Span,
    },
    /// A bare guard with no species restriction.
    Property { guard: Expr, span: Span },
    Not(Box<Pattern>, Span),
    And(Box<Pattern>, Box<Pattern>, Span),
    Or(Box<Pattern>, Box<Pattern>, Span),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Any(span)
            | Pattern::Named { span, .. }
            | Pattern::Property { span, .. }
            | Pattern::Not(_, span)
            | Pattern::And(_, _, span)
            | Pattern::Or(_, _, span) => *span,
        }
    }
}

// コマンド（アクションブロック）
#[derive(Debug, Clone)]
pub enum Command {
    /// Does nothing; the unit of sequencing.
    Skip,
    /// `name <- expr`; the target must be a declared attribute or view.
    Assign {
        name: String,
        expr: Expr,
        span: Span,
    },
    /// `let name = expr { body }`; the binding is scoped to the body.
    Let {
        name: String,
        value_type: ValueType,
        expr: Expr,
        body: Box<Command>,
        span: Span,
    },
    IfThenElse {
        guard: Expr,
        then_branch: Box<Command>,
        else_branch: Option<Box<Command>>,
        span: Span,
    },
    /// `send tag(args) to target in delay`.
    Send {
        tag: String,
        args: Vec<Expr>,
        target: Option<Pattern>,
        delay: Expr,
        span: Span,
    },
    Block(Vec<Command>),
}

impl Command {
    pub fn span(&self) -> Span {
        match self {
            Command::Skip | Command::Block(_) => Span::default(),
            Command::Assign { span, .. }
            | Command::Let { span, .. }
            | Command::IfThenElse { span, .. }
            | Command::Send { span, .. } => *span,
        }
    }
}
