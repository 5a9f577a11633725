use super::{BlockType, Catalog};
use crate::codegen::{CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::Result;
use crate::mutation::{MutationPart, MutationSchema};
use crate::scope::VariableFilter;
use crate::workspace::{BlockId, InputTemplate};

const EMPTY: &str = "''";

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(BlockType::value("text", &["String"]).field("TEXT", ""));
    catalog.register(
        BlockType::value("text_join", &["String"]).mutation(
            MutationSchema::new("text_create_join_container").part(
                MutationPart::repeated("items", 2)
                    .helper("text_create_join_item")
                    .input(InputTemplate::value("ADD")),
            ),
        ),
    );
    catalog.register(
        BlockType::value("text_length", &["Number"])
            .input(InputTemplate::value("VALUE").check("String").label("length of")),
    );
    catalog.register(
        BlockType::value("text_isEmpty", &["Boolean"])
            .input(InputTemplate::value("VALUE").check("String")),
    );
    catalog.register(
        BlockType::value("text_changeCase", &["String"])
            .field("CASE", "UPPERCASE")
            .input(InputTemplate::value("TEXT").check("String")),
    );
    catalog.register(
        BlockType::value("text_trim", &["String"])
            .field("MODE", "BOTH")
            .input(InputTemplate::value("TEXT").check("String")),
    );
    catalog.register(
        BlockType::statement("text_append")
            .references("VAR", VariableFilter::default().writable())
            .input(InputTemplate::value("TEXT").label("append text")),
    );
    catalog.register(
        BlockType::value("text_indexOf", &["Number"])
            .field("END", "FIRST")
            .input(InputTemplate::value("VALUE").check("String").label("in text"))
            .input(InputTemplate::value("FIND").check("String")),
    );
    catalog.register(
        BlockType::value("text_charAt", &["String"])
            .field("WHERE", "FROM_START")
            .input(InputTemplate::value("VALUE").check("String").label("in text"))
            .input(InputTemplate::value("AT").check("Number")),
    );
    catalog.register(
        BlockType::value("text_getSubstring", &["String"])
            .field("WHERE1", "FROM_START")
            .field("WHERE2", "FROM_START")
            .input(InputTemplate::value("STRING").check("String").label("in text"))
            .input(InputTemplate::value("AT1").check("Number"))
            .input(InputTemplate::value("AT2").check("Number")),
    );
    catalog.register(
        BlockType::statement("controls_log").input(InputTemplate::value("TEXT").label("log")),
    );

    generators.register("text", text);
    generators.register("text_join", text_join);
    generators.register("text_length", text_length);
    generators.register("text_isEmpty", text_is_empty);
    generators.register("text_changeCase", text_change_case);
    generators.register("text_trim", text_trim);
    generators.register("text_append", text_append);
    generators.register("text_indexOf", text_index_of);
    generators.register("text_charAt", text_char_at);
    generators.register("text_getSubstring", text_get_substring);
    generators.register("controls_log", controls_log);
}

/// Integer value of a literal index, as typed into a number block.
fn literal_index(code: &str) -> Option<i64> {
    code.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.trunc() as i64)
}

fn text(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.field(id, "TEXT")?;
    Ok(Generated::Expression(gen.quote(value), Order::ATOMIC))
}

fn text_join(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let count = gen.mutation(id)?.count("items");
    match count {
        0 => Ok(Generated::Expression(EMPTY.to_string(), Order::ATOMIC)),
        1 => {
            let item = gen.value_or(id, "ADD0", Order::NONE, EMPTY)?;
            Ok(Generated::Expression(format!("str({})", item), Order::FUNCTION_CALL))
        }
        2 => {
            let a = gen.value_or(id, "ADD0", Order::NONE, EMPTY)?;
            let b = gen.value_or(id, "ADD1", Order::NONE, EMPTY)?;
            Ok(Generated::Expression(
                format!("str({}) + str({})", a, b),
                Order::ADDITIVE,
            ))
        }
        _ => {
            let mut items = Vec::with_capacity(count);
            for n in 0..count {
                items.push(gen.value_or(id, &format!("ADD{}", n), Order::NONE, EMPTY)?);
            }
            let temp = gen.distinct_name("temp_value");
            Ok(Generated::Expression(
                format!(
                    "''.join([str({temp}) for {temp} in [{}]])",
                    items.join(", "),
                    temp = temp
                ),
                Order::FUNCTION_CALL,
            ))
        }
    }
}

fn text_length(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, EMPTY)?;
    Ok(Generated::Expression(format!("len({})", value), Order::FUNCTION_CALL))
}

fn text_is_empty(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, EMPTY)?;
    Ok(Generated::Expression(format!("not len({})", value), Order::LOGICAL_NOT))
}

fn text_change_case(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let method = match gen.field(id, "CASE")? {
        "LOWERCASE" => ".lower()",
        "TITLECASE" => ".title()",
        _ => ".upper()",
    };
    let value = gen.value_or(id, "TEXT", Order::MEMBER, EMPTY)?;
    Ok(Generated::Expression(format!("{}{}", value, method), Order::MEMBER))
}

fn text_trim(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let method = match gen.field(id, "MODE")? {
        "LEFT" => ".lstrip()",
        "RIGHT" => ".rstrip()",
        _ => ".strip()",
    };
    let value = gen.value_or(id, "TEXT", Order::MEMBER, EMPTY)?;
    Ok(Generated::Expression(format!("{}{}", value, method), Order::MEMBER))
}

fn text_append(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let name = gen.reference_name(id);
    let value = gen.value_or(id, "TEXT", Order::NONE, EMPTY)?;
    Ok(Generated::Statement(format!("{name} = str({name}) + str({})", value, name = name)))
}

fn text_index_of(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let method = if gen.field(id, "END")? == "LAST" { "rfind" } else { "find" };
    let find = gen.value_or(id, "FIND", Order::NONE, EMPTY)?;
    let text = gen.value_or(id, "VALUE", Order::MEMBER, EMPTY)?;
    // One-based result, so the `+ 1` has to bind like any other sum.
    Ok(Generated::Expression(
        format!("{}.{}({}) + 1", text, method, find),
        Order::ADDITIVE,
    ))
}

fn text_char_at(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let at = gen.value_or(id, "AT", Order::UNARY_SIGN, "1")?;
    let text = gen.value_or(id, "VALUE", Order::MEMBER, EMPTY)?;
    let code = match gen.field(id, "WHERE")? {
        "FIRST" => format!("{}[0]", text),
        "LAST" => format!("{}[-1]", text),
        "FROM_END" => format!("{}[-{}]", text, at),
        "RANDOM" => {
            gen.add_definition("import_random", "import random");
            let function = gen.provide_function(
                "text_random_letter",
                &[
                    "def {{FUNCTION_NAME}}(text):",
                    "  x = int(random.random() * len(text))",
                    "  return text[x];",
                ],
            );
            return Ok(Generated::Expression(
                format!("{}({})", function, text),
                Order::FUNCTION_CALL,
            ));
        }
        _ => match literal_index(&at) {
            Some(index) => format!("{}[{}]", text, index - 1),
            None => format!("{}[int({} - 1)]", text, at),
        },
    };
    Ok(Generated::Expression(code, Order::MEMBER))
}

fn text_get_substring(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let text = gen.value_or(id, "STRING", Order::MEMBER, EMPTY)?;
    let where1 = gen.field(id, "WHERE1")?;
    let where2 = gen.field(id, "WHERE2")?;
    let at1 = gen.value_or(id, "AT1", Order::ADDITIVE, "1")?;
    // Tighter than additive: a counted-from-end index lands in `1 - at2`.
    let at2 = gen.value_or(id, "AT2", Order::MULTIPLICATIVE, "1")?;

    let start = match (where1, literal_index(&at1)) {
        ("FIRST", _) => String::new(),
        ("FROM_START", Some(1)) => String::new(),
        ("FROM_START", Some(n)) => (n - 1).to_string(),
        ("FROM_START", None) => format!("int({} - 1)", at1),
        ("FROM_END", Some(n)) => (-n).to_string(),
        ("FROM_END", None) => format!("-int({})", at1),
        _ => at1,
    };
    let end = match (where2, literal_index(&at2)) {
        ("LAST", _) => String::new(),
        ("FROM_END", Some(1)) => String::new(),
        ("FROM_START", Some(n)) => n.to_string(),
        ("FROM_START", None) => format!("int({})", at2),
        ("FROM_END", Some(n)) => (1 - n).to_string(),
        ("FROM_END", None) => {
            gen.add_definition("import_sys", "import sys");
            format!("int(1 - {}) or sys.maxsize", at2)
        }
        _ => at2,
    };
    Ok(Generated::Expression(
        format!("{}[{} : {}]", text, start, end),
        Order::MEMBER,
    ))
}

fn controls_log(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "TEXT", Order::NONE, EMPTY)?;
    Ok(Generated::Statement(format!("log({})", value)))
}
