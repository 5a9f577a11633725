use super::{BlockType, Catalog};
use crate::codegen::{CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::Result;
use crate::mutation::{MutationPart, MutationSchema};
use crate::workspace::{BlockId, InputTemplate};

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(
        BlockType::statement("controls_if")
            .input(InputTemplate::value("IF0").check("Boolean").label("if"))
            .input(InputTemplate::statement("DO0").label("do"))
            .mutation(
                MutationSchema::new("controls_if_if")
                    .part(
                        MutationPart::repeated("elseif", 0)
                            .starting_at(1)
                            .helper("controls_if_elseif")
                            .input(InputTemplate::value("IF").check("Boolean").label("else if"))
                            .input(InputTemplate::statement("DO").label("do")),
                    )
                    .part(
                        MutationPart::terminal("else")
                            .helper("controls_if_else")
                            .input(InputTemplate::statement("ELSE").label("else")),
                    ),
            ),
    );
    catalog.register(
        BlockType::value("logic_compare", &["Boolean"])
            .field("OP", "EQ")
            .input(InputTemplate::value("A"))
            .input(InputTemplate::value("B")),
    );
    catalog.register(
        BlockType::value("logic_operation", &["Boolean"])
            .field("OP", "AND")
            .input(InputTemplate::value("A").check("Boolean"))
            .input(InputTemplate::value("B").check("Boolean")),
    );
    catalog.register(
        BlockType::value("logic_negate", &["Boolean"])
            .input(InputTemplate::value("BOOL").check("Boolean").label("not")),
    );
    catalog.register(BlockType::value("logic_boolean", &["Boolean"]).field("BOOL", "TRUE"));
    catalog.register(BlockType::value("logic_null", &[]));
    catalog.register(
        BlockType::value("logic_ternary", &[])
            .input(InputTemplate::value("IF").check("Boolean").label("test"))
            .input(InputTemplate::value("THEN").label("if true"))
            .input(InputTemplate::value("ELSE").label("if false")),
    );

    generators.register("controls_if", controls_if);
    generators.register("logic_compare", logic_compare);
    generators.register("logic_operation", logic_operation);
    generators.register("logic_negate", logic_negate);
    generators.register("logic_boolean", logic_boolean);
    generators.register("logic_null", logic_null);
    generators.register("logic_ternary", logic_ternary);
}

/// Each `else if` nests inside the previous clause's fallback slot:
/// `do_if(c0, b0, do_if(c1, b1, else))`.
fn controls_if(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let state = gen.mutation(id)?;
    let clause_count = 1 + state.count("elseif");
    let has_else = state.count("else") > 0;

    let mut clauses = Vec::with_capacity(clause_count);
    for n in 0..clause_count {
        let condition = gen.value_or(id, &format!("IF{}", n), Order::NONE, "False")?;
        let branch = gen.statement_or(id, &format!("DO{}", n), "[]")?;
        clauses.push((condition, branch));
    }
    let mut tail = if has_else {
        Some(gen.statement_or(id, "ELSE", "[]")?)
    } else {
        None
    };

    for (condition, branch) in clauses.into_iter().rev() {
        let mut code = format!("do_if({},\n{}", condition, gen.indent(&branch));
        if let Some(fallback) = tail {
            code.push_str(",\n");
            code.push_str(&gen.indent(&fallback));
        }
        code.push_str("\n)");
        tail = Some(code);
    }
    Ok(Generated::Statement(tail.unwrap_or_default()))
}

fn logic_compare(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let operator = match gen.field(id, "OP")? {
        "NEQ" => "!=",
        "LT" => "<",
        "LTE" => "<=",
        "GT" => ">",
        "GTE" => ">=",
        _ => "==",
    };
    let order = Order::RELATIONAL;
    let a = gen.value_or(id, "A", order, "0")?;
    let b = gen.value_or(id, "B", order, "0")?;
    Ok(Generated::Expression(format!("{} {} {}", a, operator, b), order))
}

fn logic_operation(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let (operator, order, neutral) = if gen.field(id, "OP")? == "OR" {
        ("or", Order::LOGICAL_OR, "False")
    } else {
        ("and", Order::LOGICAL_AND, "True")
    };
    let a = gen.value_of(id, "A", order)?;
    let b = gen.value_of(id, "B", order)?;
    let (a, b) = match (a, b) {
        (None, None) => ("False".to_string(), "False".to_string()),
        (a, b) => (
            a.unwrap_or_else(|| neutral.to_string()),
            b.unwrap_or_else(|| neutral.to_string()),
        ),
    };
    Ok(Generated::Expression(format!("{} {} {}", a, operator, b), order))
}

/// Runtime expressions cannot overload `not`, so negation compares with
/// `False`. The operand binds tighter than a comparison to avoid chaining.
fn logic_negate(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let operand = gen.value_or(id, "BOOL", Order::BITWISE_OR, "True")?;
    Ok(Generated::Expression(
        format!("False == {}", operand),
        Order::RELATIONAL,
    ))
}

fn logic_boolean(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let code = if gen.field(id, "BOOL")? == "TRUE" { "True" } else { "False" };
    Ok(Generated::Expression(code.to_string(), Order::ATOMIC))
}

fn logic_null(_gen: &mut CodeGenerator<'_>, _id: BlockId) -> Result<Generated> {
    Ok(Generated::Expression("None".to_string(), Order::ATOMIC))
}

fn logic_ternary(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let order = Order::CONDITIONAL;
    let condition = gen.value_or(id, "IF", order, "False")?;
    let then = gen.value_or(id, "THEN", order, "None")?;
    let otherwise = gen.value_or(id, "ELSE", order, "None")?;
    Ok(Generated::Expression(
        format!("{} if {} else {}", then, condition, otherwise),
        order,
    ))
}
