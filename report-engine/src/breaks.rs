//! FILENAME: report-engine/src/breaks.rs
//! PURPOSE: Report breaks: named groups of expressions whose change between
//! two rows starts a new group.
//! CONTEXT: Breaks are nested in definition order. When a break triggers,
//! every break defined after it triggers too.

use serde::{Deserialize, Serialize};

use engine::{optimize, CompiledExpr, Compiler};

use crate::error::{ReportError, ReportResult};

/// A break as a report definition describes it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BreakDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Constant expression; nonzero starts a new page on the break.
    #[serde(default)]
    pub newpage: Option<String>,
    #[serde(default)]
    pub headernewpage: Option<String>,
    #[serde(default)]
    pub suppressblank: Option<String>,
}

impl BreakDef {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        BreakDef {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..BreakDef::default()
        }
    }
}

/// Layout flags of a break. They are fixed when the break is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakAttributes {
    pub newpage: bool,
    pub headernewpage: bool,
    pub suppressblank: bool,
}

#[derive(Debug)]
pub struct Break {
    pub(crate) name: String,
    pub(crate) fields: Vec<CompiledExpr>,
    pub(crate) attributes: BreakAttributes,
}

impl Break {
    pub(crate) fn new(name: &str, attributes: BreakAttributes) -> Self {
        Break {
            name: name.to_string(),
            fields: Vec::new(),
            attributes,
        }
    }

    /// Creates the break with its attributes and fields.
    pub(crate) fn from_def(def: &BreakDef, compiler: &Compiler<'_>) -> ReportResult<Break> {
        let attributes = BreakAttributes {
            newpage: attribute(compiler, &def.name, "newpage", def.newpage.as_deref())?,
            headernewpage: attribute(compiler, &def.name, "headernewpage", def.headernewpage.as_deref())?,
            suppressblank: attribute(compiler, &def.name, "suppressblank", def.suppressblank.as_deref())?,
        };
        let mut brk = Break::new(&def.name, attributes);
        for field in &def.fields {
            brk.add_field(compiler.compile_str(field)?);
        }
        Ok(brk)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> BreakAttributes {
        self.attributes
    }

    pub fn fields(&self) -> &[CompiledExpr] {
        &self.fields
    }

    pub(crate) fn add_field(&mut self, expr: CompiledExpr) {
        self.fields.push(expr);
    }

    /// A break without fields can never trigger.
    pub fn check(&self) -> ReportResult<()> {
        if self.fields.is_empty() {
            return Err(ReportError::UselessBreak(self.name.clone()));
        }
        Ok(())
    }
}

/// Compiles an attribute expression. Only constant numbers are accepted;
/// a missing attribute is off.
fn attribute(compiler: &Compiler<'_>, name: &str, attribute: &'static str, text: Option<&str>) -> ReportResult<bool> {
    let text = match text {
        Some(text) => text,
        None => return Ok(false),
    };
    let mut expr = compiler.compile_str(text)?;
    optimize(&mut expr, compiler.numeric, compiler.date_order);
    expr.constant_value()
        .and_then(|value| value.as_number())
        .map(|n| !n.is_zero())
        .ok_or_else(|| ReportError::InvalidBreakAttribute {
            name: name.to_string(),
            attribute,
        })
}

/// Checks that every break of a report can trigger.
pub fn check_break_fields(breaks: &[Break]) -> ReportResult<()> {
    breaks.iter().try_for_each(Break::check)
}
