//! Parser for action scripts
//!
//! Recursive descent over the token stream from [`Lexer`]. The grammar is a
//! small Python subset: imports, assignments, `for`, `if/elif/else`,
//! `break`/`continue`/`pass` and expressions with calls, indexing, slices and
//! method calls. Function and class definitions are not part of it.

use serde_json::Value;

use crate::core::{NetpilotError, Result};
use crate::sandbox::lexer::{FPart, Lexer, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import a, b as c`
    Import(Vec<(String, String)>),
    /// `from m import a, b as c`
    FromImport {
        module: String,
        names: Vec<(String, String)>,
    },
    Assign {
        target: Target,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    Expr(Expr),
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Index(Box<Expr>, Box<Expr>),
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    FString(Vec<FExpr>),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        value: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Attr(Box<Expr>, String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FExpr {
    Text(String),
    Expr(Expr),
}

/// Parse a full script
pub fn parse(src: &str) -> Result<Vec<Stmt>> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at(&Token::Eof) {
        if parser.eat(&Token::Newline) {
            continue;
        }
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parse a single expression, used for f-string fragments
pub fn parse_expr(src: &str) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    parser.eat(&Token::Newline);
    if !parser.at(&Token::Eof) {
        return Err(parser.err("unexpected trailing tokens in expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn err(&self, msg: impl std::fmt::Display) -> NetpilotError {
        NetpilotError::tool(format!("syntax error on line {}: {}", self.line(), msg))
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Token) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == kw)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', found {:?}", op, self.peek())))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.advance() {
            Token::Name(n) if !is_keyword(&n) => Ok(n),
            other => Err(self.err(format!("expected a name, found {:?}", other))),
        }
    }

    fn end_of_statement(&mut self) -> Result<()> {
        if self.eat(&Token::Newline) || self.at(&Token::Eof) || self.at(&Token::Dedent) {
            Ok(())
        } else {
            Err(self.err(format!("unexpected {:?}", self.peek())))
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek().clone() {
            Token::Name(n) => match n.as_str() {
                "import" => self.import_stmt(),
                "from" => self.from_import_stmt(),
                "for" => self.for_stmt(),
                "if" => self.if_stmt(),
                "pass" => {
                    self.advance();
                    self.end_of_statement()?;
                    Ok(Stmt::Pass)
                }
                "break" => {
                    self.advance();
                    self.end_of_statement()?;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.advance();
                    self.end_of_statement()?;
                    Ok(Stmt::Continue)
                }
                "def" | "class" | "while" | "try" | "with" | "lambda" | "return" | "global"
                | "del" | "async" | "await" | "yield" | "raise" => Err(self.err(format!(
                    "'{}' is not supported in action scripts",
                    n
                ))),
                _ => self.simple_stmt(),
            },
            _ => self.simple_stmt(),
        }
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import_stmt(&mut self) -> Result<Stmt> {
        self.advance();
        let mut modules = Vec::new();
        loop {
            let module = self.dotted_name()?;
            let alias = if self.eat_keyword("as") {
                self.expect_name()?
            } else {
                module.split('.').next().unwrap_or(&module).to_string()
            };
            modules.push((module, alias));
            if !self.eat_op(",") {
                break;
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Import(modules))
    }

    fn from_import_stmt(&mut self) -> Result<Stmt> {
        self.advance();
        let module = self.dotted_name()?;
        if !self.eat_keyword("import") {
            return Err(self.err("expected 'import'"));
        }
        let parens = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            let name = if self.eat_op("*") {
                "*".to_string()
            } else {
                self.expect_name()?
            };
            let alias = if self.eat_keyword("as") {
                self.expect_name()?
            } else {
                name.clone()
            };
            names.push((name, alias));
            if !self.eat_op(",") {
                break;
            }
        }
        if parens {
            self.expect_op(")")?;
        }
        self.end_of_statement()?;
        Ok(Stmt::FromImport { module, names })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.eat(&Token::Newline) {
            // single-line body: `if x: print(x)`
            return Ok(vec![self.simple_stmt()?]);
        }
        if !self.eat(&Token::Indent) {
            return Err(self.err("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&Token::Dedent) {
            if self.at(&Token::Eof) {
                break;
            }
            if self.eat(&Token::Newline) {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn for_stmt(&mut self) -> Result<Stmt> {
        self.advance();
        let target = self.target_list()?;
        if !self.eat_keyword("in") {
            return Err(self.err("expected 'in'"));
        }
        let iter = self.expr()?;
        let body = self.block()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.expr()?;
        branches.push((cond, self.block()?));
        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                let cond = self.expr()?;
                branches.push((cond, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn target_list(&mut self) -> Result<Target> {
        let first = self.target_atom()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_keyword("in") || self.at_op("=") {
                break;
            }
            items.push(self.target_atom()?);
        }
        Ok(Target::Tuple(items))
    }

    fn target_atom(&mut self) -> Result<Target> {
        if self.eat_op("(") {
            let t = self.target_list()?;
            self.expect_op(")")?;
            return Ok(t);
        }
        let expr = self.postfix()?;
        to_target(expr).ok_or_else(|| self.err("invalid assignment target"))
    }

    fn simple_stmt(&mut self) -> Result<Stmt> {
        let start = self.pos;

        // assignment: scan for a top-level `=` before the end of the line
        if self.looks_like_assignment() {
            let target = self.target_list()?;
            self.expect_op("=")?;
            let value = self.tuple_expr()?;
            self.end_of_statement()?;
            return Ok(Stmt::Assign { target, value });
        }

        let expr = self.tuple_expr()?;
        for (op, bin) in [("+=", BinOp::Add), ("-=", BinOp::Sub), ("*=", BinOp::Mul)] {
            if self.eat_op(op) {
                let target = to_target(expr).ok_or_else(|| self.err("invalid assignment target"))?;
                let value = self.tuple_expr()?;
                self.end_of_statement()?;
                return Ok(Stmt::AugAssign {
                    target,
                    op: bin,
                    value,
                });
            }
        }
        if self.pos == start {
            return Err(self.err(format!("unexpected {:?}", self.peek())));
        }
        self.end_of_statement()?;
        Ok(Stmt::Expr(expr))
    }

    fn looks_like_assignment(&self) -> bool {
        let mut depth = 0usize;
        let mut i = 0;
        loop {
            match self.peek_at(i) {
                Token::Newline | Token::Eof | Token::Dedent | Token::Indent => return false,
                Token::Op("(") | Token::Op("[") | Token::Op("{") => depth += 1,
                Token::Op(")") | Token::Op("]") | Token::Op("}") => {
                    depth = depth.saturating_sub(1)
                }
                Token::Op("=") if depth == 0 => return true,
                Token::Op(":") if depth == 0 => return false,
                _ => {}
            }
            i += 1;
        }
    }

    /// Expression list; `a, b` becomes a list literal
    fn tuple_expr(&mut self) -> Result<Expr> {
        let first = self.expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if matches!(self.peek(), Token::Newline | Token::Eof) {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::List(items))
    }

    pub fn expr(&mut self) -> Result<Expr> {
        let value = self.or_expr()?;
        if self.at_keyword("if") {
            // ternary only when an `else` follows on the same logical line
            let save = self.pos;
            self.advance();
            let cond = self.or_expr()?;
            if self.eat_keyword("else") {
                let orelse = self.expr()?;
                return Ok(Expr::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(value),
                    orelse: Box::new(orelse),
                });
            }
            self.pos = save;
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().clone() {
                Token::Op("==") => BinOp::Eq,
                Token::Op("!=") => BinOp::Ne,
                Token::Op("<") => BinOp::Lt,
                Token::Op("<=") => BinOp::Le,
                Token::Op(">") => BinOp::Gt,
                Token::Op(">=") => BinOp::Ge,
                Token::Name(n) if n == "in" => BinOp::In,
                Token::Name(n) if n == "not" && matches!(self.peek_at(1), Token::Name(m) if m == "in") => {
                    self.advance();
                    BinOp::NotIn
                }
                Token::Name(n) if n == "is" => {
                    self.advance();
                    let op = if self.eat_keyword("not") {
                        BinOp::Ne
                    } else {
                        BinOp::Eq
                    };
                    let right = self.additive()?;
                    left = Expr::Binary(Box::new(left), op, Box::new(right));
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.multiplicative()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                let (args, kwargs) = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr> {
        let start = if self.at_op(":") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if self.eat_op(":") {
            let end = if self.at_op("]") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op("]")?;
            return Ok(Expr::Slice {
                value: Box::new(value),
                start,
                end,
            });
        }
        self.expect_op("]")?;
        match start {
            Some(index) => Ok(Expr::Index(Box::new(value), index)),
            None => Err(self.err("empty subscript")),
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Name(n), Token::Op("=")) => Some(n.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.pos += 2;
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.err("positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Str(mut s) => {
                // implicit concatenation of adjacent literals
                while let Token::Str(next) = self.peek().clone() {
                    s.push_str(&next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::FStr(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    match part {
                        FPart::Text(t) => out.push(FExpr::Text(t)),
                        FPart::Expr(src) => out.push(FExpr::Expr(parse_expr(&src)?)),
                    }
                }
                Ok(Expr::FString(out))
            }
            Token::Name(n) => match n.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::Null)),
                kw if is_keyword(kw) => Err(self.err(format!("unexpected keyword '{}'", kw))),
                _ => Ok(Expr::Name(n)),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let inner = self.tuple_expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                while !self.eat_op("]") {
                    items.push(self.expr()?);
                    if !self.eat_op(",") {
                        self.expect_op("]")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expr()?;
                    self.expect_op(":")?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(self.err(format!("unexpected {:?}", other))),
        }
    }
}

fn to_target(expr: Expr) -> Option<Target> {
    match expr {
        Expr::Name(n) => Some(Target::Name(n)),
        Expr::Index(value, index) => Some(Target::Index(value, index)),
        Expr::List(items) => items
            .into_iter()
            .map(to_target)
            .collect::<Option<Vec<_>>>()
            .map(Target::Tuple),
        _ => None,
    }
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "import"
            | "from"
            | "as"
            | "for"
            | "in"
            | "if"
            | "elif"
            | "else"
            | "and"
            | "or"
            | "not"
            | "is"
            | "pass"
            | "break"
            | "continue"
            | "def"
            | "class"
            | "while"
            | "return"
            | "lambda"
    )
}
