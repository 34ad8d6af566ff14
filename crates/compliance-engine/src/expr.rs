//! Infix rule expression calculator.
//!
//! An expression is a flat token list such as
//! `[{value:"12", name:"冷静期"}, ">", {value:"24"}]`. Evaluation converts
//! it to postfix and folds it into a result tree whose nodes carry a
//! forward name, a reversed name for failure reporting and a per-node
//! suggestion.

use shared_types::{ExprItem, OP_NULL};
use thiserror::Error;

use crate::text::append_suggestion;
use crate::value;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("合规公式缺少表达式，请检查后重试")]
    MissLeftValue {
        expression: String,
        index: usize,
        name: String,
    },
    #[error("合规公式缺少表达式，请检查后重试")]
    MissRightValue {
        expression: String,
        index: usize,
        name: String,
    },
    #[error("合规公式缺少表达式，请检查后重试")]
    MissOperator {
        expression: String,
        index: usize,
        name: String,
    },
    #[error("未知的{type_name}。表达式 {expression} 在位置{}， {type_name} {name} 处发现错误。请检查后重试。", .index + 1)]
    UnknownOperator {
        expression: String,
        index: usize,
        type_name: String,
        name: String,
    },
    #[error("表达式校验不通过，请确认后再次提交")]
    InvalidValue {
        expression: String,
        index: usize,
        name: String,
    },
    #[error("{type_name} {name} 处的值{values}无法计算。表达式 {expression} 在位置{}， {type_name} {name} 处发现错误。请检查后重试。", .index + 1)]
    ExprCalc {
        expression: String,
        index: usize,
        type_name: String,
        name: String,
        values: String,
    },
}

/// The value carried by a result tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    None,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl NodeValue {
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(flag) => *flag,
            Self::Number(number) => *number != 0.0,
            Self::Text(text) => !text.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Bool(true) => Some(1.0),
            Self::Text(text) => value::number(text),
            _ => None,
        }
    }
}

/// One node of the evaluated result tree. Leaves come from operand
/// tokens; internal nodes record the operator that produced them.
#[derive(Debug, Clone)]
pub struct Node {
    pub value: NodeValue,
    pub name: String,
    pub reversed_name: String,
    pub suggestion: Option<String>,
    pub field_name: Option<String>,
    pub operator: Option<&'static OpDef>,
    pub index: usize,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
}

impl Node {
    fn leaf(value: Option<String>, field_name: Option<String>, index: usize) -> Self {
        let name = field_name
            .clone()
            .or_else(|| value.clone())
            .unwrap_or_default();
        Self {
            value: match value {
                Some(text) => NodeValue::Text(text),
                None => NodeValue::None,
            },
            reversed_name: name.clone(),
            name,
            suggestion: None,
            field_name,
            operator: None,
            index,
            left: None,
            right: None,
        }
    }

    fn type_name(&self) -> &'static str {
        if self.field_name.is_some() {
            "schema字段"
        } else {
            "输入值"
        }
    }

    pub fn is_schema_field(&self) -> bool {
        self.field_name.is_some()
    }

    fn is_number(&self) -> bool {
        value::is_number(self.value.as_text())
    }

    fn number(&self) -> Option<f64> {
        self.value.number()
    }
}

struct DivideByZero;

type OpFn = fn(&Node, &Node) -> Result<NodeValue, DivideByZero>;

/// Operator metadata: display name, inverse used in failure text,
/// precedence level and the binary function.
pub struct OpDef {
    pub name: &'static str,
    inverse: Option<&'static str>,
    level: u32,
    apply: OpFn,
}

impl std::fmt::Debug for OpDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl OpDef {
    pub fn reversed_name(&self) -> &'static str {
        self.inverse.unwrap_or(self.name)
    }

    fn is_bool(&self) -> bool {
        matches!(
            self.name,
            ">" | "<" | "≥" | "≤" | "=" | "==" | "≠" | "包含" | "不包含"
        )
    }

    fn is_numeric(&self) -> bool {
        matches!(self.name, "+" | "-" | "×" | "÷" | ">" | "<" | "≥" | "≤" | "=")
    }

    /// Suggestion verb for containment operators.
    fn alias(&self) -> Option<&'static str> {
        match self.name {
            "包含" => Some("补充"),
            "不包含" => Some("删除"),
            _ => None,
        }
    }
}

fn op_add(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Number(
        left.number().unwrap_or(0.0) + right.number().unwrap_or(0.0),
    ))
}

fn op_sub(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Number(
        left.number().unwrap_or(0.0) - right.number().unwrap_or(0.0),
    ))
}

fn op_mul(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Number(
        left.number().unwrap_or(0.0) * right.number().unwrap_or(0.0),
    ))
}

fn op_div(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    let divisor = right.number().unwrap_or(0.0);
    if divisor == 0.0 {
        return Err(DivideByZero);
    }
    Ok(NodeValue::Number(left.number().unwrap_or(0.0) / divisor))
}

fn eq_values(left: &Node, right: &Node) -> bool {
    if left.value == right.value {
        return true;
    }
    if left.value.as_text() == Some(OP_NULL) {
        return right.value.is_empty();
    }
    if right.value.as_text() == Some(OP_NULL) {
        return left.value.is_empty();
    }
    match (left.number(), right.number()) {
        (Some(number1), Some(number2)) => value::numbers_close(number1, number2),
        _ => false,
    }
}

fn op_eq(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(eq_values(left, right)))
}

fn op_not_eq(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(!eq_values(left, right)))
}

fn op_gt(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(match (left.number(), right.number()) {
        (Some(number1), Some(number2)) => number1 > number2,
        _ => false,
    }))
}

fn op_lt(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(match (left.number(), right.number()) {
        (Some(number1), Some(number2)) => number1 < number2,
        _ => false,
    }))
}

fn op_gte(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(
        op_gt(left, right)?.truthy() || eq_values(left, right),
    ))
}

fn op_lte(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(
        op_lt(left, right)?.truthy() || eq_values(left, right),
    ))
}

fn op_contain(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(match (left.value.as_text(), right.value.as_text()) {
        (Some(haystack), Some(needle)) if !haystack.is_empty() && !needle.is_empty() => {
            haystack.contains(needle)
        }
        _ => false,
    }))
}

fn op_not_contain(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(NodeValue::Bool(!op_contain(left, right)?.truthy()))
}

fn op_or(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(if left.value.truthy() {
        left.value.clone()
    } else {
        right.value.clone()
    })
}

fn op_and(left: &Node, right: &Node) -> Result<NodeValue, DivideByZero> {
    Ok(if left.value.truthy() {
        right.value.clone()
    } else {
        left.value.clone()
    })
}

const OPS: &[OpDef] = &[
    OpDef { name: "+", inverse: None, level: 100, apply: op_add },
    OpDef { name: "-", inverse: None, level: 100, apply: op_sub },
    OpDef { name: "×", inverse: None, level: 100, apply: op_mul },
    OpDef { name: "÷", inverse: None, level: 100, apply: op_div },
    OpDef { name: ">", inverse: Some("≤"), level: 90, apply: op_gt },
    OpDef { name: "<", inverse: Some("≥"), level: 90, apply: op_lt },
    OpDef { name: "≥", inverse: Some("<"), level: 90, apply: op_gte },
    OpDef { name: "≤", inverse: Some(">"), level: 90, apply: op_lte },
    OpDef { name: "=", inverse: Some("≠"), level: 90, apply: op_eq },
    OpDef { name: "==", inverse: Some("≠"), level: 90, apply: op_eq },
    OpDef { name: "≠", inverse: Some("=="), level: 90, apply: op_not_eq },
    OpDef { name: "包含", inverse: Some("不包含"), level: 90, apply: op_contain },
    OpDef { name: "不包含", inverse: Some("包含"), level: 90, apply: op_not_contain },
    OpDef { name: "或", inverse: Some("且"), level: 70, apply: op_or },
    OpDef { name: "且", inverse: Some("或"), level: 70, apply: op_and },
];

fn canonical_op(name: &str) -> &str {
    match name {
        "!=" | "不等于" => "≠",
        "/" => "÷",
        "x" | "*" => "×",
        ">=" => "≥",
        "<=" => "≤",
        "||" => "或",
        "&&" => "且",
        other => other,
    }
}

fn lookup_op(name: &str) -> Option<&'static OpDef> {
    OPS.iter().find(|op| op.name == name)
}

#[derive(Debug, Clone)]
enum Tok {
    Value(Node),
    Op { def: &'static OpDef, index: usize },
    Unknown { name: String, index: usize },
}

impl Tok {
    fn name(&self) -> String {
        match self {
            Self::Value(node) => node.name.clone(),
            Self::Op { def, .. } => def.name.to_string(),
            Self::Unknown { name, .. } => name.clone(),
        }
    }

    fn reversed_name(&self) -> String {
        match self {
            Self::Value(node) => node.reversed_name.clone(),
            Self::Op { def, .. } => def.reversed_name().to_string(),
            Self::Unknown { name, .. } => name.clone(),
        }
    }
}

/// Evaluates one authored expression.
pub struct ExprCalculator {
    tokens: Vec<Tok>,
    unique: bool,
    validate_number_operator: bool,
}

impl ExprCalculator {
    pub fn new(expression: &[ExprItem]) -> Self {
        let tokens = expression
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                ExprItem::Value { value, name } => {
                    Tok::Value(Node::leaf(value.clone(), name.clone(), index))
                }
                ExprItem::Op(op) => {
                    let canonical = canonical_op(op);
                    if canonical == OP_NULL {
                        // bare NULL sentinel is an operand, not an operator
                        return Tok::Value(Node::leaf(Some(OP_NULL.to_string()), None, index));
                    }
                    if let Some(def) = lookup_op(canonical) {
                        return Tok::Op { def, index };
                    }
                    Tok::Unknown {
                        name: op.clone(),
                        index,
                    }
                }
            })
            .collect();
        Self {
            tokens,
            unique: false,
            validate_number_operator: false,
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_number_validation(mut self, enabled: bool) -> Self {
        self.validate_number_operator = enabled;
        self
    }

    pub fn expr_text(&self) -> String {
        self.tokens
            .iter()
            .map(Tok::name)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn reversed_expr_text(&self) -> String {
        self.tokens
            .iter()
            .map(Tok::reversed_name)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn run(&self) -> Result<Node, ExprError> {
        self.run_impl(false)
    }

    /// Structural check without computing values.
    pub fn validate(&self) -> Result<(), ExprError> {
        self.run_impl(true).map(|_| ())
    }

    fn run_impl(&self, only_validate: bool) -> Result<Node, ExprError> {
        let mut tokens = self.tokens.clone();
        if !only_validate && self.unique && tokens.len() > 2 {
            tokens = self.convert_contain_once(tokens)?;
            if tokens.len() == 1 {
                if let Some(Tok::Value(node)) = tokens.pop() {
                    return Ok(node);
                }
            }
        }

        let suffix = self.gen_suffix_expr(tokens)?;
        if suffix.len() == 1 {
            return Err(match &suffix[0] {
                Tok::Value(node) => ExprError::MissOperator {
                    expression: self.expr_text(),
                    index: node.index,
                    name: node.name.clone(),
                },
                token => ExprError::MissLeftValue {
                    expression: self.expr_text(),
                    index: self.token_index(token),
                    name: token.name(),
                },
            });
        }

        let mut stack: Vec<Node> = Vec::new();
        for token in suffix {
            let (def, index) = match token {
                Tok::Value(node) => {
                    stack.push(node);
                    continue;
                }
                Tok::Op { def, index } => (def, index),
                Tok::Unknown { name, index } => {
                    return Err(ExprError::UnknownOperator {
                        expression: self.expr_text(),
                        index,
                        type_name: "值".to_string(),
                        name,
                    })
                }
            };

            let right = stack.pop().ok_or_else(|| ExprError::MissLeftValue {
                expression: self.expr_text(),
                index,
                name: def.name.to_string(),
            })?;
            let left = stack.pop().ok_or_else(|| ExprError::MissRightValue {
                expression: self.expr_text(),
                index,
                name: def.name.to_string(),
            })?;

            let value = if only_validate {
                if self.validate_number_operator && def.is_numeric() {
                    for operand in [&right, &left] {
                        if !operand.is_number()
                            && !operand.is_schema_field()
                            && operand.operator.is_none()
                        {
                            return Err(ExprError::InvalidValue {
                                expression: self.expr_text(),
                                index: operand.index,
                                name: operand.name.clone(),
                            });
                        }
                    }
                }
                NodeValue::Bool(true)
            } else {
                Self::operate(&right, &left, def).map_err(|_| self.calc_error(&right))?
            };

            stack.push(Node {
                value,
                name: format!("{} {} {}", left.name, def.name, right.name),
                reversed_name: format!(
                    "{} {} {}",
                    left.reversed_name,
                    def.reversed_name(),
                    right.reversed_name
                ),
                suggestion: Some(Self::render_node_suggestion(def, &right, &left)),
                field_name: None,
                operator: Some(def),
                index,
                left: Some(Box::new(left)),
                right: Some(Box::new(right)),
            });
        }

        if stack.len() >= 2 {
            return Err(ExprError::MissOperator {
                expression: self.expr_text(),
                index: stack[0].index,
                name: stack[0].name.clone(),
            });
        }
        stack.pop().ok_or_else(|| ExprError::MissOperator {
            expression: self.expr_text(),
            index: 0,
            name: String::new(),
        })
    }

    fn token_index(&self, token: &Tok) -> usize {
        match token {
            Tok::Value(node) => node.index,
            Tok::Op { index, .. } => *index,
            Tok::Unknown { index, .. } => *index,
        }
    }

    fn calc_error(&self, node: &Node) -> ExprError {
        let values = match node.value.as_text() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => "为空".to_string(),
        };
        ExprError::ExprCalc {
            expression: self.expr_text(),
            index: node.index,
            type_name: node.type_name().to_string(),
            name: node.name.clone(),
            values,
        }
    }

    /// Collapse a run of "field 包含 a 或 field 包含 b …" into one
    /// synthetic "唯一包含" node: true when exactly one operand matched.
    fn convert_run(&self, run: Vec<Tok>) -> Result<Vec<Tok>, ExprError> {
        let contain = run.iter().find_map(|token| match token {
            Tok::Op { def, index } if def.name == "包含" => Some((*def, *index)),
            _ => None,
        });
        let (Some((operator, operator_index)), true) = (contain, run.len() > 3) else {
            return Ok(run);
        };
        let Some(Tok::Value(field)) = run.first() else {
            return Ok(run);
        };
        let field = field.clone();

        let values: Vec<&Node> = run
            .iter()
            .filter_map(|token| match token {
                Tok::Value(node) if node.field_name != field.field_name => Some(node),
                _ => None,
            })
            .collect();

        let mut matched = 0usize;
        let mut missed = 0usize;
        for node in &values {
            let result = Self::operate(node, &field, operator).map_err(|_| self.calc_error(&field))?;
            if result.truthy() {
                matched += 1;
            } else {
                missed += 1;
            }
        }

        let flag = matched == 1;
        let value_names: Vec<&str> = values.iter().map(|node| node.name.as_str()).collect();
        let listed = format!("[{}]", value_names.join(", "));
        let op_name = if flag { "唯一包含" } else { "未唯一包含" };
        let suggestion = if flag {
            String::new()
        } else {
            let text = value_names.join("或");
            if missed == values.len() {
                format!("请在“{}”内补充“{}”", field.name, text)
            } else {
                format!("请在“{}”内删除“{}”", field.name, text)
            }
        };

        Ok(vec![Tok::Value(Node {
            value: NodeValue::Bool(flag),
            name: format!("{} 唯一包含 {}", field.name, listed),
            reversed_name: format!("{} {} {}", field.name, op_name, listed),
            suggestion: Some(suggestion),
            field_name: None,
            operator: Some(operator),
            index: operator_index,
            left: Some(Box::new(field)),
            right: None,
        })])
    }

    /// Group consecutive "或/包含" tokens over a single field and hand
    /// each run to [`Self::convert_run`].
    fn convert_contain_once(&self, tokens: Vec<Tok>) -> Result<Vec<Tok>, ExprError> {
        let mut run: Vec<Tok> = Vec::new();
        let mut result: Vec<Tok> = Vec::new();
        for token in tokens {
            match &token {
                Tok::Op { def, .. } => {
                    if def.name == "包含" || def.name == "或" {
                        run.push(token);
                    } else {
                        result.extend(self.convert_run(std::mem::take(&mut run))?);
                        result.push(token);
                    }
                }
                Tok::Value(node) if node.field_name.is_some() => {
                    let same_field = match run.first() {
                        None => true,
                        Some(Tok::Value(first)) => first.field_name == node.field_name,
                        Some(_) => false,
                    };
                    if same_field {
                        run.push(token);
                    } else {
                        let last_operator = run.pop();
                        result.extend(self.convert_run(std::mem::take(&mut run))?);
                        if let Some(last) = last_operator {
                            result.push(last);
                        }
                        run = vec![token];
                    }
                }
                _ => run.push(token),
            }
        }
        if !run.is_empty() {
            result.extend(self.convert_run(run)?);
        }
        Ok(result)
    }

    fn gen_suffix_expr(&self, tokens: Vec<Tok>) -> Result<Vec<Tok>, ExprError> {
        let mut operators: Vec<Tok> = Vec::new();
        let mut output: Vec<Tok> = Vec::new();

        for token in tokens {
            match &token {
                Tok::Value(_) => output.push(token),
                Tok::Op { def, .. } => {
                    let level = def.level;
                    let mut placed = false;
                    while let Some(Tok::Op { def: top, .. }) = operators.last() {
                        if top.level >= level {
                            if let Some(popped) = operators.pop() {
                                output.push(popped);
                            }
                        } else {
                            operators.push(token.clone());
                            placed = true;
                            break;
                        }
                    }
                    if !placed {
                        operators.push(token);
                    }
                }
                Tok::Unknown { name, index } => {
                    return Err(ExprError::UnknownOperator {
                        expression: self.expr_text(),
                        index: *index,
                        type_name: "值".to_string(),
                        name: name.clone(),
                    })
                }
            }
        }
        output.extend(operators.into_iter().rev());
        Ok(output)
    }

    /// Apply `def` to `left op right`. Comparison chains evaluate left
    /// to right: when the left operand is itself a comparison result,
    /// `a < b == c` becomes `a < b 且 b == c`.
    fn operate(right: &Node, left: &Node, def: &'static OpDef) -> Result<NodeValue, DivideByZero> {
        if def.is_bool() {
            if let Some(parent) = left.operator {
                if parent.is_bool() {
                    if !left.value.truthy() {
                        return Ok(left.value.clone());
                    }
                    if let Some(inner_right) = left.right.as_deref() {
                        return (def.apply)(inner_right, right);
                    }
                }
            }
        }
        (def.apply)(left, right)
    }

    fn render_node_suggestion(def: &OpDef, right: &Node, left: &Node) -> String {
        match def.alias() {
            Some(verb) => format!("请在“{}”内{}“{}”", left.name, verb, right.name),
            None => format!("{} {} {}", left.name, def.name, right.name),
        }
    }

    /// Collect the failing leaves of a result tree; logical nodes are
    /// descended, everything else falsy is reported as is.
    pub fn search_result_tree(node: &Node) -> Vec<&Node> {
        fn search<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
            let logical = matches!(node.operator.map(|op| op.name), Some("或") | Some("且"));
            if !logical && !node.value.truthy() {
                out.push(node);
            } else {
                if let Some(left) = node.left.as_deref() {
                    search(left, out);
                }
                if let Some(right) = node.right.as_deref() {
                    search(right, out);
                }
            }
        }
        let mut result = Vec::new();
        search(node, &mut result);
        if result.is_empty() {
            result.push(node);
        }
        result
    }

    /// Render (message, reason) for a failed result tree. `NULL`
    /// comparisons get dedicated emptiness wording.
    pub fn render_message_by_result(
        result: &Node,
        addition_reason: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let mut message: Option<String> = None;
        let mut reason_text: Option<String> = addition_reason.map(str::to_string);

        if result.value.truthy() {
            return (message, reason_text);
        }

        for node in Self::search_result_tree(result) {
            let mut node_reason = node.reversed_name.clone();
            let mut node_message = node.suggestion.clone();
            let right_is_null = node
                .right
                .as_deref()
                .map(|right| right.value.as_text() == Some(OP_NULL))
                .unwrap_or(false);
            if node.left.is_some() && right_is_null {
                if let (Some(op), Some(left)) = (node.operator, node.left.as_deref()) {
                    match op.name {
                        "≠" => {
                            node_reason = format!("{} 为空", left.name);
                            node_message = Some(format!("请补充{}内容", left.name));
                        }
                        "=" | "==" => {
                            node_reason = format!("{} 不为空", left.name);
                        }
                        _ => {}
                    }
                }
            }
            message = append_suggestion(message, node_message.as_deref(), "\n\n");
            reason_text = append_suggestion(reason_text, Some(&node_reason), "\n");
        }

        (message, reason_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(items: Vec<ExprItem>) -> Node {
        ExprCalculator::new(&items).run().unwrap()
    }

    #[test]
    fn test_unit_equality() {
        let result = run(vec![
            ExprItem::field_value("冷静期", "24小时"),
            ExprItem::op("="),
            ExprItem::value("1天"),
        ]);
        assert!(result.value.truthy());
    }

    #[test]
    fn test_chained_comparison_left_to_right() {
        let result = run(vec![
            ExprItem::field_value("冷静期", "26"),
            ExprItem::op(">"),
            ExprItem::value("25"),
            ExprItem::op(">"),
            ExprItem::value("24"),
            ExprItem::op("<"),
            ExprItem::value("27"),
        ]);
        assert!(result.value.truthy());

        let result = run(vec![
            ExprItem::field_value("冷静期", "26"),
            ExprItem::op(">"),
            ExprItem::value("25"),
            ExprItem::op(">"),
            ExprItem::value("28"),
        ]);
        assert!(!result.value.truthy());
    }

    #[test]
    fn test_operator_aliases() {
        let result = run(vec![
            ExprItem::value("10"),
            ExprItem::op(">="),
            ExprItem::value("10"),
        ]);
        assert!(result.value.truthy());
        assert_eq!(result.name, "10 ≥ 10");
        assert_eq!(result.reversed_name, "10 < 10");
    }

    #[test]
    fn test_or_returns_effective_operand() {
        let result = run(vec![
            ExprItem::field_value("期限", ""),
            ExprItem::op("≠"),
            ExprItem::value("NULL"),
            ExprItem::op("或"),
            ExprItem::field_value("次数", "3"),
            ExprItem::op(">"),
            ExprItem::value("2"),
        ]);
        assert!(result.value.truthy());
    }

    #[test]
    fn test_null_reason_rendering() {
        let result = run(vec![
            ExprItem::field_value("公司名称", ""),
            ExprItem::op("≠"),
            ExprItem::value("NULL"),
        ]);
        assert!(!result.value.truthy());
        let (message, reason) = ExprCalculator::render_message_by_result(&result, None);
        assert_eq!(reason.as_deref(), Some("公司名称 为空"));
        assert_eq!(message.as_deref(), Some("请补充公司名称内容"));
    }

    #[test]
    fn test_unique_containment_delete_suggestion() {
        let value = "中国平安公司";
        let calculator = ExprCalculator::new(&[
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("中国"),
            ExprItem::op("或"),
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("公司"),
        ])
        .with_unique(true);
        let result = calculator.run().unwrap();
        assert!(!result.value.truthy());
        assert_eq!(
            result.suggestion.as_deref(),
            Some("请在“公司名称”内删除“中国或公司”")
        );
        assert!(result.reversed_name.contains("未唯一包含"));
    }

    #[test]
    fn test_unique_containment_supplement_suggestion() {
        let value = "平安集团";
        let calculator = ExprCalculator::new(&[
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("中国"),
            ExprItem::op("或"),
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("公司"),
        ])
        .with_unique(true);
        let result = calculator.run().unwrap();
        assert!(!result.value.truthy());
        assert_eq!(
            result.suggestion.as_deref(),
            Some("请在“公司名称”内补充“中国或公司”")
        );
    }

    #[test]
    fn test_unique_containment_exactly_one() {
        let value = "平安公司";
        let calculator = ExprCalculator::new(&[
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("中国"),
            ExprItem::op("或"),
            ExprItem::field_value("公司名称", value),
            ExprItem::op("包含"),
            ExprItem::value("公司"),
        ])
        .with_unique(true);
        let result = calculator.run().unwrap();
        assert!(result.value.truthy());
    }

    #[test]
    fn test_contain_suggestion() {
        let result = run(vec![
            ExprItem::field_value("公司名称", "平安集团"),
            ExprItem::op("包含"),
            ExprItem::value("中国"),
        ]);
        assert!(!result.value.truthy());
        assert_eq!(
            result.suggestion.as_deref(),
            Some("请在“公司名称”内补充“中国”")
        );
    }

    #[test]
    fn test_structure_errors() {
        let error = ExprCalculator::new(&[ExprItem::value("12")]).run().unwrap_err();
        assert!(matches!(error, ExprError::MissOperator { .. }));

        let error = ExprCalculator::new(&[ExprItem::op("<")]).run().unwrap_err();
        assert!(matches!(error, ExprError::MissLeftValue { .. }));

        let error = ExprCalculator::new(&[ExprItem::value("12"), ExprItem::op("<")])
            .run()
            .unwrap_err();
        assert!(matches!(error, ExprError::MissRightValue { .. }));

        let error = ExprCalculator::new(&[
            ExprItem::value("12"),
            ExprItem::op("%%"),
            ExprItem::value("3"),
        ])
        .run()
        .unwrap_err();
        assert!(matches!(error, ExprError::UnknownOperator { .. }));
    }

    #[test]
    fn test_divide_by_zero() {
        let error = ExprCalculator::new(&[
            ExprItem::value("12"),
            ExprItem::op("÷"),
            ExprItem::value("0"),
        ])
        .run()
        .unwrap_err();
        assert!(matches!(error, ExprError::ExprCalc { .. }));
    }

    #[test]
    fn test_validate_number_operator() {
        let calculator = ExprCalculator::new(&[
            ExprItem::value("合同"),
            ExprItem::op(">"),
            ExprItem::value("1"),
        ])
        .with_number_validation(true);
        assert!(matches!(
            calculator.validate().unwrap_err(),
            ExprError::InvalidValue { .. }
        ));

        // schema 字段在校验阶段没有值，放行
        let calculator = ExprCalculator::new(&[
            ExprItem::field("公司注册资本"),
            ExprItem::op(">"),
            ExprItem::value("1"),
        ])
        .with_number_validation(true);
        assert!(calculator.validate().is_ok());
    }

    #[test]
    fn test_empty_values_arithmetic_as_zero() {
        let result = run(vec![
            ExprItem::field_value("余额", ""),
            ExprItem::op("+"),
            ExprItem::value("5"),
            ExprItem::op("="),
            ExprItem::value("5"),
        ]);
        assert!(result.value.truthy());
    }
}
