//! Source-like rendering of IR nodes, used in error messages and logs.

use super::{BinOp, BoolOp, Clause, CmpOp, Expr, FnDef, GlobalKind, Program, QueryNode, Stmt};
use core::fmt::{self, Display, Formatter, Write};

fn write_names(f: &mut Formatter<'_>, names: &[alloc::string::String]) -> fmt::Result {
    write!(f, "(")?;
    for (i, n) in names.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", n)?;
    }
    if names.len() == 1 {
        write!(f, ",")?;
    }
    write!(f, ")")
}

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
        })
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        })
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name(n) => f.write_str(n),
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Tuple(elts) => {
                write!(f, "(")?;
                write_list(f, elts, ", ")?;
                if elts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Index(v, i) => write!(f, "{}[{}]", v, i),
            Expr::BinOp(l, op, r) => write!(f, "({} {} {})", l, op, r),
            Expr::Not(v) => write!(f, "not {}", v),
            Expr::Compare(l, op, r) => write!(f, "{} {} {}", l, op, r),
            Expr::BoolOp(op, vs) => {
                let sep = match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                };
                write!(f, "(")?;
                write_list(f, vs, sep)?;
                write!(f, ")")
            }
            Expr::Call(func, args) => {
                write!(f, "{}(", func)?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::Builtin(b, args) => {
                write!(f, "{}(", b.name())?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::FirstThen(first, then) => {
                write!(f, "first_then([")?;
                write_list(f, first, ", ")?;
                write!(f, "], {})", then)
            }
            Expr::EmptySet => write!(f, "Set()"),
            Expr::EmptyTree => write!(f, "Tree()"),
            Expr::GetCount(s, e) => write!(f, "{}.getcount({})", s, e),
            Expr::DictLookup { map, key, default } => match default {
                Some(d) => write!(f, "{}.get({}, {})", map, key, d),
                None => write!(f, "{}[{}]", map, key),
            },
            Expr::ImgLookup { set, mask, bounds } => {
                write!(f, "{}.imglookup('{}', ", set, mask)?;
                write_names(f, bounds)?;
                write!(f, ")")
            }
            Expr::SetFromMap { map, mask } => write!(f, "{}.setfrommap('{}')", map, mask),
            Expr::Wrap(v) => write!(f, "wrap({})", v),
            Expr::Unwrap(v) => write!(f, "unwrap({})", v),
            Expr::Query { name, node } => write!(f, "QUERY('{}', {})", name, node),
        }
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Clause::RelMember { vars, rel } => {
                write!(f, "for ")?;
                write_names(f, vars)?;
                write!(f, " in {}", rel)
            }
            Clause::SingMember { vars, value } => {
                write!(f, "for ")?;
                write_names(f, vars)?;
                write!(f, " in {{{}}}", value)
            }
            Clause::WithoutMember { clause, value } => write!(f, "{} - {{{}}}", clause, value),
            Clause::VarsMember { vars, iter } => {
                write!(f, "for ")?;
                write_names(f, vars)?;
                write!(f, " in {}", iter)
            }
            Clause::Cond(e) => write!(f, "if {}", e),
        }
    }
}

impl Display for QueryNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Comp(comp) => {
                write!(f, "{{{}", comp.resexp)?;
                for cl in &comp.clauses {
                    write!(f, " {}", cl)?;
                }
                write!(f, "}}")
            }
            QueryNode::Aggr { op, value } => write!(f, "{}({})", op.name(), value),
            QueryNode::AggrRestr {
                op,
                value,
                params,
                restr,
            } => {
                write!(f, "{}({}, ", op.name(), value)?;
                write_names(f, params)?;
                write!(f, ", {})", restr)
            }
        }
    }
}

struct Indented<'a> {
    block: &'a [Stmt],
    level: usize,
}

fn write_indent(f: &mut Formatter<'_>, level: usize) -> fmt::Result {
    for _ in 0..level {
        f.write_str("    ")?;
    }
    Ok(())
}

impl Display for Indented<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.block.is_empty() {
            write_indent(f, self.level)?;
            return writeln!(f, "pass");
        }
        for stmt in self.block {
            write_stmt(f, stmt, self.level)?;
        }
        Ok(())
    }
}

fn write_stmt(f: &mut Formatter<'_>, stmt: &Stmt, level: usize) -> fmt::Result {
    write_indent(f, level)?;
    let inner = level + 1;
    match stmt {
        Stmt::Assign { target, value } => writeln!(f, "{} = {}", target, value),
        Stmt::DecompAssign { vars, value } => {
            write_names(f, vars)?;
            writeln!(f, " = {}", value)
        }
        Stmt::Expr(e) => writeln!(f, "{}", e),
        Stmt::If { test, body, orelse } => {
            writeln!(f, "if {}:", test)?;
            write!(f, "{}", Indented { block: body, level: inner })?;
            if !orelse.is_empty() {
                write_indent(f, level)?;
                writeln!(f, "else:")?;
                write!(f, "{}", Indented { block: orelse, level: inner })?;
            }
            Ok(())
        }
        Stmt::For { target, iter, body } => {
            writeln!(f, "for {} in {}:", target, iter)?;
            write!(f, "{}", Indented { block: body, level: inner })
        }
        Stmt::DecompFor { vars, iter, body } => {
            write!(f, "for ")?;
            write_names(f, vars)?;
            writeln!(f, " in {}:", iter)?;
            write!(f, "{}", Indented { block: body, level: inner })
        }
        Stmt::While { test, body } => {
            writeln!(f, "while {}:", test)?;
            write!(f, "{}", Indented { block: body, level: inner })
        }
        Stmt::Return(e) => writeln!(f, "return {}", e),
        Stmt::RelUpdate { rel, op, elem } => writeln!(f, "{}.rel{}({})", rel, op.name(), elem),
        Stmt::RelClear { rel } => writeln!(f, "{}.relclear()", rel),
        Stmt::SetUpdate { target, op, elem } => writeln!(f, "{}.{}({})", target, op.name(), elem),
        Stmt::SetClear { target } => writeln!(f, "{}.clear()", target),
        Stmt::MapAssign { map, key, value } => writeln!(f, "{}.mapassign({}, {})", map, key, value),
        Stmt::MapDelete { map, key } => writeln!(f, "{}.mapdelete({})", map, key),
        Stmt::MapClear { map } => writeln!(f, "{}.mapclear()", map),
        Stmt::ResetDemand { names } => {
            write!(f, "reset_demand")?;
            write_names(f, names)?;
            writeln!(f)
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl Display for FnDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        write_list(f, &self.params, ", ")?;
        writeln!(f, "):")?;
        write!(
            f,
            "{}",
            Indented {
                block: &self.body,
                level: 1
            }
        )
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for g in &self.globals {
            match g.kind {
                GlobalKind::Relation { counted: true } => writeln!(f, "{} = CSet()", g.name)?,
                GlobalKind::Relation { counted: false } => writeln!(f, "{} = Set()", g.name)?,
                GlobalKind::Map => writeln!(f, "{} = Map()", g.name)?,
            }
        }
        for func in &self.funcs {
            f.write_char('\n')?;
            write!(f, "{}", func)?;
        }
        if !self.body.is_empty() {
            f.write_char('\n')?;
            for stmt in &self.body {
                write_stmt(f, stmt, 0)?;
            }
        }
        Ok(())
    }
}
