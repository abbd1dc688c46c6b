//! Arithmetic Expression Parser
//!
//! Parses the body of `$(( ))` by precedence climbing:
//! - $((1 + 2))
//! - $((x++))
//! - $((a ? b : c))
//! - $((2#1010))
//!
//! The ternary is kept as two nested operations: `a ? (b : c)`.

use crate::ast::types::{Arithmetic, Subarg, Variable};
use crate::parser::parser::{ParseResult, Parser};
use crate::parser::types::{is_name_char, is_name_start};
use crate::parser::word_parser::ArgContext;

/// Binary operators, longest first, with precedence and right associativity
const BINARY_OPS: &[(&str, u8, bool)] = &[
    ("<<=", 2, true),
    (">>=", 2, true),
    ("**", 14, true),
    ("<<", 11, false),
    (">>", 11, false),
    ("<=", 10, false),
    (">=", 10, false),
    ("==", 9, false),
    ("!=", 9, false),
    ("&&", 5, false),
    ("||", 4, false),
    ("+=", 2, true),
    ("-=", 2, true),
    ("*=", 2, true),
    ("/=", 2, true),
    ("%=", 2, true),
    ("&=", 2, true),
    ("^=", 2, true),
    ("|=", 2, true),
    ("+", 12, false),
    ("-", 12, false),
    ("*", 13, false),
    ("/", 13, false),
    ("%", 13, false),
    ("<", 10, false),
    (">", 10, false),
    ("&", 8, false),
    ("^", 7, false),
    ("|", 6, false),
    ("=", 2, true),
    ("?", 3, true),
    (",", 1, false),
];

fn operation(op: &str, lhs: Option<Arithmetic>, rhs: Option<Arithmetic>) -> Arithmetic {
    Arithmetic::Operation {
        op: op.to_string(),
        lhs: lhs.map(Box::new),
        rhs: rhs.map(Box::new),
    }
}

impl<'a> Parser<'a> {
    /// Body of `$((`, `i` just after the opening parentheses.
    ///
    /// Returns the expression and the position of the closing `))`.
    pub(crate) fn parse_arithmetic_expansion(&mut self, i: usize) -> ParseResult<(Arithmetic, usize)> {
        let (arith, j) = self.parse_arith_expr(i, 0)?;
        let j = self.skip_arith_blanks(j);
        if !self.starts(j, "))") {
            return Err(self.error(j, format!("expecting '))', found {}", self.describe(j))));
        }
        Ok((arith, j))
    }

    fn skip_arith_blanks(&self, mut i: usize) -> usize {
        loop {
            match self.at(i) {
                b' ' | b'\t' | b'\n' => i += 1,
                b'\\' if self.at(i + 1) == b'\n' => i += 2,
                _ => return i,
            }
        }
    }

    fn binary_op_at(&self, i: usize) -> Option<(&'static str, u8, bool)> {
        BINARY_OPS.iter().copied().find(|(op, _, _)| self.starts(i, op))
    }

    fn parse_arith_expr(&mut self, i: usize, min_prec: u8) -> ParseResult<(Arithmetic, usize)> {
        let (mut lhs, mut i) = self.parse_arith_unary(i)?;
        loop {
            let j = self.skip_arith_blanks(i);
            let Some((op, prec, right_assoc)) = self.binary_op_at(j) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let next_min = if right_assoc { prec } else { prec + 1 };
            if op == "?" {
                let (mid, k) = self.parse_arith_expr(j + 1, 0)?;
                let k = self.skip_arith_blanks(k);
                if self.at(k) != b':' {
                    return Err(self.error(k, format!("expecting ':', found {}", self.describe(k))));
                }
                let (rhs, m) = self.parse_arith_expr(k + 1, next_min)?;
                lhs = operation("?", Some(lhs), Some(operation(":", Some(mid), Some(rhs))));
                i = m;
                continue;
            }
            let (rhs, k) = self.parse_arith_expr(j + op.len(), next_min)?;
            lhs = operation(op, Some(lhs), Some(rhs));
            i = k;
        }
        Ok((lhs, i))
    }

    fn parse_arith_unary(&mut self, i: usize) -> ParseResult<(Arithmetic, usize)> {
        let i = self.skip_arith_blanks(i);
        for op in ["++", "--"] {
            if self.starts(i, op) {
                let (operand, j) = self.parse_arith_unary(i + 2)?;
                return Ok((operation(op, None, Some(operand)), j));
            }
        }
        if matches!(self.at(i), b'+' | b'-' | b'!' | b'~') {
            let op = (self.at(i) as char).to_string();
            let (operand, j) = self.parse_arith_unary(i + 1)?;
            return Ok((operation(&op, None, Some(operand)), j));
        }
        self.parse_arith_primary(i)
    }

    fn parse_arith_primary(&mut self, i: usize) -> ParseResult<(Arithmetic, usize)> {
        let c = self.at(i);
        if c == b'(' {
            let (inner, j) = self.parse_arith_expr(i + 1, 0)?;
            let j = self.skip_arith_blanks(j);
            let j = self.expect_symbol(j, ")")?;
            return Ok((Arithmetic::Parenthesis(Box::new(inner)), j));
        }
        if c.is_ascii_digit() {
            let mut j = i;
            while is_name_char(self.at(j)) || self.at(j) == b'#' {
                j += 1;
            }
            return Ok((Arithmetic::Number(self.src[i..j].to_string()), j));
        }
        if c == b'$' {
            let arith = match self.parse_dollar(i, false)? {
                Some((Subarg::Variable { var, .. }, j)) => {
                    (Arithmetic::Variable { var, dollar: true }, j)
                }
                Some((Subarg::Subshell { lst, .. }, j)) => (Arithmetic::Subshell(lst), j),
                Some((Subarg::Arithmetic { arith, .. }, j)) => {
                    (Arithmetic::Parenthesis(Box::new(arith)), j)
                }
                _ => return Err(self.error(i, "unexpected '$' in arithmetic")),
            };
            return Ok(arith);
        }
        if is_name_start(c) {
            let mut j = i + 1;
            while is_name_char(self.at(j)) {
                j += 1;
            }
            let mut var = Variable::new(&self.src[i..j]);
            if self.at(j) == b'[' {
                self.require_bash(j, "array subscript")?;
                let (idx, k) = self.parse_arg(j + 1, ArgContext::Index)?;
                j = self.expect_symbol(k, "]")?;
                var.index = Some(idx);
            }
            let node = Arithmetic::Variable { var, dollar: false };
            let k = self.skip_arith_blanks(j);
            for op in ["++", "--"] {
                if self.starts(k, op) {
                    return Ok((operation(op, Some(node), None), k + 2));
                }
            }
            return Ok((node, j));
        }
        Err(self.error(
            i,
            format!("unexpected {} in arithmetic", self.describe(i)),
        ))
    }
}
