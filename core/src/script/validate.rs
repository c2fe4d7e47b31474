//! Static checks run when a statement is prepared

use super::ast::{Stmt, StmtKind};
use crate::frontend::EvalFault;

#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_function: bool,
    in_loop: bool,
}

/// Reject `return`, `break` and `continue` where they cannot apply
pub fn validate(stmt: &Stmt) -> Result<(), EvalFault> {
    check(stmt, Scope::default())
}

fn check_block(body: &[Stmt], scope: Scope) -> Result<(), EvalFault> {
    body.iter().try_for_each(|stmt| check(stmt, scope))
}

fn check(stmt: &Stmt, scope: Scope) -> Result<(), EvalFault> {
    let misplaced = |message: &str| Err(EvalFault::new("SyntaxError", message).at_line(stmt.line));
    match &stmt.kind {
        StmtKind::Return(_) if !scope.in_function => misplaced("'return' outside function"),
        StmtKind::Break if !scope.in_loop => misplaced("'break' outside loop"),
        StmtKind::Continue if !scope.in_loop => misplaced("'continue' not properly in loop"),
        StmtKind::If { branches, orelse } => {
            for (_, body) in branches {
                check_block(body, scope)?;
            }
            check_block(orelse, scope)
        }
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => {
            let inner = Scope {
                in_loop: true,
                ..scope
            };
            check_block(body, inner)
        }
        StmtKind::Def { body, .. } => {
            let inner = Scope {
                in_function: true,
                in_loop: false,
            };
            check_block(body, inner)
        }
        // Class bodies start a fresh scope
        StmtKind::Class { body, .. } => check_block(body, Scope::default()),
        StmtKind::Try {
            body,
            handlers,
            finally,
        } => {
            check_block(body, scope)?;
            for handler in handlers {
                check_block(&handler.body, scope)?;
            }
            check_block(finally, scope)
        }
        _ => Ok(()),
    }
}
