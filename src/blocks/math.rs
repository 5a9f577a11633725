use super::{BlockType, Catalog};
use crate::codegen::{format_number, CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::{EditorError, Result};
use crate::scope::VariableFilter;
use crate::workspace::{BlockId, InputTemplate};

const IMPORT_MATH: (&str, &str) = ("import_math", "import math");
const IMPORT_RANDOM: (&str, &str) = ("import_random", "import random");

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(BlockType::value("math_number", &["Number"]).field("NUM", "0"));
    catalog.register(
        BlockType::value("math_arithmetic", &["Number"])
            .field("OP", "ADD")
            .input(InputTemplate::value("A").check("Number"))
            .input(InputTemplate::value("B").check("Number")),
    );
    for name in ["math_single", "math_round", "math_trig"] {
        let default_op = match name {
            "math_round" => "ROUND",
            "math_trig" => "SIN",
            _ => "ROOT",
        };
        catalog.register(
            BlockType::value(name, &["Number"])
                .field("OP", default_op)
                .input(InputTemplate::value("NUM").check("Number")),
        );
    }
    catalog.register(BlockType::value("math_constant", &["Number"]).field("CONSTANT", "PI"));
    catalog.register(
        BlockType::value("math_number_property", &["Boolean"])
            .field("PROPERTY", "EVEN")
            .input(InputTemplate::value("NUMBER_TO_CHECK").check("Number"))
            .input(InputTemplate::value("DIVISOR").check("Number")),
    );
    catalog.register(
        BlockType::statement("math_change")
            .field("MODE", "INCREMENT")
            .references("VAR", VariableFilter::default().of_type("Number").writable()),
    );
    catalog.register(
        BlockType::value("math_on_list", &["Number"])
            .field("OP", "SUM")
            .input(InputTemplate::value("LIST").check("Array")),
    );
    catalog.register(
        BlockType::value("math_modulo", &["Number"])
            .input(InputTemplate::value("DIVIDEND").check("Number"))
            .input(InputTemplate::value("DIVISOR").check("Number").label("%")),
    );
    catalog.register(
        BlockType::value("math_constrain", &["Number"])
            .input(InputTemplate::value("VALUE").check("Number").label("constrain"))
            .input(InputTemplate::value("LOW").check("Number").label("low"))
            .input(InputTemplate::value("HIGH").check("Number").label("high")),
    );
    catalog.register(
        BlockType::value("math_random_int", &["Number"])
            .input(InputTemplate::value("FROM").check("Number"))
            .input(InputTemplate::value("TO").check("Number")),
    );
    catalog.register(BlockType::value("math_random_float", &["Number"]));

    generators.register("math_number", math_number);
    generators.register("math_arithmetic", math_arithmetic);
    generators.register("math_single", math_single);
    generators.register("math_round", math_single);
    generators.register("math_trig", math_single);
    generators.register("math_constant", math_constant);
    generators.register("math_number_property", math_number_property);
    generators.register("math_change", math_change);
    generators.register("math_on_list", math_on_list);
    generators.register("math_modulo", math_modulo);
    generators.register("math_constrain", math_constrain);
    generators.register("math_random_int", math_random_int);
    generators.register("math_random_float", math_random_float);
}

fn unknown_operator(gen: &CodeGenerator<'_>, id: BlockId, operator: &str) -> EditorError {
    let block_type = gen
        .block(id)
        .map(|block| block.block_type.clone())
        .unwrap_or_default();
    EditorError::MalformedOutput {
        block_type,
        reason: format!("unknown operator '{}'", operator),
    }
}

fn math_number(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let raw = gen.field(id, "NUM")?;
    let value = raw.trim().parse::<f64>().unwrap_or_else(|_| {
        tracing::warn!(block = %id, value = raw, "number field does not parse, using 0");
        0.0
    });
    let order = if value < 0.0 {
        Order::UNARY_SIGN
    } else {
        Order::ATOMIC
    };
    Ok(Generated::Expression(format_number(value), order))
}

fn math_arithmetic(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let operator = gen.field(id, "OP")?;
    let (symbol, order) = match operator {
        "ADD" => (" + ", Order::ADDITIVE),
        "MINUS" => (" - ", Order::ADDITIVE),
        "MULTIPLY" => (" * ", Order::MULTIPLICATIVE),
        "DIVIDE" => (" / ", Order::MULTIPLICATIVE),
        "POWER" => (" ** ", Order::EXPONENTIATION),
        other => return Err(unknown_operator(gen, id, other)),
    };
    let a = gen.value_or(id, "A", order, "0")?;
    let b = gen.value_or(id, "B", order, "0")?;
    Ok(Generated::Expression(format!("{}{}{}", a, symbol, b), order))
}

fn math_single(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let operator = gen.field(id, "OP")?;
    if operator == "NEG" {
        let operand = gen.value_or(id, "NUM", Order::UNARY_SIGN, "0")?;
        return Ok(Generated::Expression(format!("-{}", operand), Order::UNARY_SIGN));
    }
    gen.add_definition(IMPORT_MATH.0, IMPORT_MATH.1);
    let arg_order = match operator {
        "SIN" | "COS" | "TAN" => Order::MULTIPLICATIVE,
        _ => Order::NONE,
    };
    let arg = gen.value_or(id, "NUM", arg_order, "0")?;
    let call = |function: &str| format!("math.{}({})", function, arg);
    let code = match operator {
        "ABS" => call("fabs"),
        "ROOT" => call("sqrt"),
        "LN" => call("log"),
        "LOG10" => call("log10"),
        "EXP" => call("exp"),
        "POW10" => format!("math.pow(10,{})", arg),
        "ROUND" => format!("round({})", arg),
        "ROUNDUP" => call("ceil"),
        "ROUNDDOWN" => call("floor"),
        "SIN" | "COS" | "TAN" => format!(
            "math.{}({} / 180.0 * math.pi)",
            operator.to_ascii_lowercase(),
            arg
        ),
        "ASIN" | "ACOS" | "ATAN" => {
            return Ok(Generated::Expression(
                format!("math.{}({}) / math.pi * 180", operator.to_ascii_lowercase(), arg),
                Order::MULTIPLICATIVE,
            ));
        }
        other => return Err(unknown_operator(gen, id, other)),
    };
    Ok(Generated::Expression(code, Order::FUNCTION_CALL))
}

fn math_constant(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let constant = gen.field(id, "CONSTANT")?;
    let (code, order) = match constant {
        "PI" => ("math.pi", Order::MEMBER),
        "E" => ("math.e", Order::MEMBER),
        "GOLDEN_RATIO" => ("(1 + math.sqrt(5)) / 2", Order::MULTIPLICATIVE),
        "SQRT2" => ("math.sqrt(2)", Order::MEMBER),
        "SQRT1_2" => ("math.sqrt(1.0 / 2)", Order::MEMBER),
        "INFINITY" => ("float('inf')", Order::ATOMIC),
        other => return Err(unknown_operator(gen, id, other)),
    };
    if constant != "INFINITY" {
        gen.add_definition(IMPORT_MATH.0, IMPORT_MATH.1);
    }
    Ok(Generated::Expression(code.to_string(), order))
}

fn math_number_property(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let number = gen.value_or(id, "NUMBER_TO_CHECK", Order::MULTIPLICATIVE, "0")?;
    let code = match gen.field(id, "PROPERTY")? {
        "EVEN" => format!("{} % 2 == 0", number),
        "ODD" => format!("{} % 2 == 1", number),
        "WHOLE" => format!("{} % 1 == 0", number),
        "POSITIVE" => format!("{} > 0", number),
        "NEGATIVE" => format!("{} < 0", number),
        "DIVISIBLE_BY" => match gen.value_of(id, "DIVISOR", Order::MULTIPLICATIVE)? {
            Some(divisor) if divisor != "0" => format!("{} % {} == 0", number, divisor),
            _ => return Ok(Generated::Expression("False".to_string(), Order::ATOMIC)),
        },
        other => return Err(unknown_operator(gen, id, other)),
    };
    Ok(Generated::Expression(code, Order::RELATIONAL))
}

fn math_change(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let direction = if gen.field(id, "MODE")? == "DECREMENT" {
        "decrement"
    } else {
        "increment"
    };
    let name = gen.reference_name(id);
    Ok(Generated::Statement(format!("{}({})", direction, name)))
}

fn math_on_list(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let operator = gen.field(id, "OP")?;
    let list = gen.value_or(id, "LIST", Order::NONE, "[]")?;
    let function = match operator {
        "SUM" => "sum".to_string(),
        "MIN" => "min".to_string(),
        "MAX" => "max".to_string(),
        "AVERAGE" => gen.provide_function(
            "math_mean",
            &[
                "def {{FUNCTION_NAME}}(myList):",
                "  localList = [e for e in myList if type(e) in (int, float, long)]",
                "  if not localList: return",
                "  return float(sum(localList)) / len(localList)",
            ],
        ),
        "MEDIAN" => gen.provide_function(
            "math_median",
            &[
                "def {{FUNCTION_NAME}}(myList):",
                "  localList = sorted([e for e in myList if type(e) in (int, float, long)])",
                "  if not localList: return",
                "  if len(localList) % 2 == 0:",
                "    return (localList[len(localList) / 2 - 1] + localList[len(localList) / 2]) / 2.0",
                "  else:",
                "    return localList[(len(localList) - 1) / 2]",
            ],
        ),
        "MODE" => gen.provide_function(
            "math_modes",
            &[
                "def {{FUNCTION_NAME}}(some_list):",
                "  modes = []",
                "  counts = []",
                "  maxCount = 1",
                "  for item in some_list:",
                "    found = False",
                "    for count in counts:",
                "      if count[0] == item:",
                "        count[1] += 1",
                "        maxCount = max(maxCount, count[1])",
                "        found = True",
                "    if not found:",
                "      counts.append([item, 1])",
                "  for counted_item, item_count in counts:",
                "    if item_count == maxCount:",
                "      modes.append(counted_item)",
                "  return modes",
            ],
        ),
        "STD_DEV" => {
            gen.add_definition(IMPORT_MATH.0, IMPORT_MATH.1);
            gen.provide_function(
                "math_standard_deviation",
                &[
                    "def {{FUNCTION_NAME}}(numbers):",
                    "  n = len(numbers)",
                    "  if n == 0: return",
                    "  mean = float(sum(numbers)) / n",
                    "  variance = sum((x - mean) ** 2 for x in numbers) / n",
                    "  return math.sqrt(variance)",
                ],
            )
        }
        "RANDOM" => {
            gen.add_definition(IMPORT_RANDOM.0, IMPORT_RANDOM.1);
            "random.choice".to_string()
        }
        other => return Err(unknown_operator(gen, id, other)),
    };
    Ok(Generated::Expression(
        format!("{}({})", function, list),
        Order::FUNCTION_CALL,
    ))
}

fn math_modulo(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let order = Order::MULTIPLICATIVE;
    let dividend = gen.value_or(id, "DIVIDEND", order, "0")?;
    let divisor = gen.value_or(id, "DIVISOR", order, "0")?;
    Ok(Generated::Expression(format!("{} % {}", dividend, divisor), order))
}

fn math_constrain(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, "0")?;
    let low = gen.value_or(id, "LOW", Order::NONE, "0")?;
    let high = gen.value_or(id, "HIGH", Order::NONE, "float('inf')")?;
    Ok(Generated::Expression(
        format!("min(max({}, {}), {})", value, low, high),
        Order::FUNCTION_CALL,
    ))
}

fn math_random_int(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    gen.add_definition(IMPORT_RANDOM.0, IMPORT_RANDOM.1);
    let from = gen.value_or(id, "FROM", Order::NONE, "0")?;
    let to = gen.value_or(id, "TO", Order::NONE, "0")?;
    Ok(Generated::Expression(
        format!("random.randint({}, {})", from, to),
        Order::FUNCTION_CALL,
    ))
}

fn math_random_float(gen: &mut CodeGenerator<'_>, _id: BlockId) -> Result<Generated> {
    gen.add_definition(IMPORT_RANDOM.0, IMPORT_RANDOM.1);
    Ok(Generated::Expression(
        "random.random()".to_string(),
        Order::FUNCTION_CALL,
    ))
}
