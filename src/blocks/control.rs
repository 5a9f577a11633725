use super::{BlockType, Catalog};
use crate::codegen::{CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::Result;
use crate::mutation::{MutationPart, MutationSchema};
use crate::workspace::{Align, BlockId, InputTemplate};

const LOOP_PASS: &str = "[]";
const EMPTY_SEQUENCE: &str = "sequence()";

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(
        BlockType::top("controls_run")
            .field("MODE", "RUNNING")
            .input(InputTemplate::statement("STACK")),
    );
    catalog.register(
        BlockType::statement("controls_wait")
            .input(InputTemplate::value("TIME").check("Number").label("wait")),
    );
    catalog.register(
        BlockType::statement("controls_wait_until")
            .input(InputTemplate::value("CONDITION").check("Boolean").label("wait until")),
    );
    catalog.register(
        BlockType::statement("controls_repeat_ext")
            .input(InputTemplate::value("TIMES").check("Number").label("repeat"))
            .input(InputTemplate::statement("DO").label("do")),
    );
    catalog.register(
        BlockType::statement("controls_whileUntil")
            .field("MODE", "WHILE")
            .input(InputTemplate::value("BOOL").check("Boolean"))
            .input(InputTemplate::statement("DO").label("do")),
    );
    catalog.register(
        BlockType::statement("controls_parallel").mutation(
            MutationSchema::new("controls_parallel_container").part(
                MutationPart::repeated("stacks", 2)
                    .helper("controls_parallel_stack")
                    .input(InputTemplate::statement("STACK").label("and")),
            ),
        ),
    );
    catalog.register(
        BlockType::statement("controls_dependents")
            .input(InputTemplate::statement("STACK").label("do"))
            .mutation(
                MutationSchema::new("controls_dependents_container").part(
                    MutationPart::repeated("dependents", 1)
                        .helper("controls_dependents_dependent")
                        .input(
                            InputTemplate::statement("DEP")
                                .label("while running")
                                .align(Align::Right),
                        ),
                ),
            ),
    );

    generators.register("controls_run", controls_run);
    generators.register("controls_wait", controls_wait);
    generators.register("controls_wait_until", controls_wait_until);
    generators.register("controls_repeat_ext", controls_repeat_ext);
    generators.register("controls_whileUntil", controls_while_until);
    generators.register("controls_parallel", controls_parallel);
    generators.register("controls_dependents", controls_dependents);
}

fn controls_run(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let later = gen.field(id, "MODE")? == "PAUSED";
    let branch = gen.statement_or(id, "STACK", EMPTY_SEQUENCE)?;
    let function = if later { "run_later" } else { "run" };
    Ok(Generated::Statement(format!("{}({})", function, branch)))
}

fn controls_wait(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let time = gen.value_or(id, "TIME", Order::NONE, "0")?;
    Ok(Generated::Statement(format!("wait({})", time)))
}

fn controls_wait_until(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let condition = gen.value_or(id, "CONDITION", Order::NONE, "True")?;
    Ok(Generated::Statement(format!("wait_until({})", condition)))
}

fn controls_repeat_ext(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let repeats = gen.value_or(id, "TIMES", Order::NONE, "0")?;
    let branch = gen.statement_or(id, "DO", LOOP_PASS)?;
    let body = gen.indent(&format!("{},\nmin_calls = {}", branch, repeats));
    Ok(Generated::Statement(format!("loop_while(False,\n{}\n)", body)))
}

fn controls_while_until(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let until = gen.field(id, "MODE")? == "UNTIL";
    let default = if until { "True" } else { "False" };
    let condition = gen.value_or(id, "BOOL", Order::NONE, default)?;
    let branch = gen.statement_or(id, "DO", LOOP_PASS)?;
    let function = if until { "loop_until" } else { "loop_while" };
    Ok(Generated::Statement(format!(
        "{}({},\n{}\n)",
        function,
        condition,
        gen.indent(&branch)
    )))
}

fn controls_parallel(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let count = gen.mutation(id)?.count("stacks");
    let mut branches = Vec::with_capacity(count);
    for n in 0..count {
        if let Some(branch) = gen.statement_code(id, &format!("STACK{}", n))? {
            branches.push(branch);
        }
    }
    if branches.is_empty() {
        return Ok(Generated::Statement("parallel()".to_string()));
    }
    Ok(Generated::Statement(format!(
        "parallel(\n{}\n)",
        gen.indent(&branches.join(",\n"))
    )))
}

/// The main stack runs while every dependent stack is kept running beside it.
fn controls_dependents(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let stack = gen.statement_or(id, "STACK", EMPTY_SEQUENCE)?;
    let count = gen.mutation(id)?.count("dependents");
    let mut dependents = Vec::with_capacity(count);
    for n in 0..count {
        if let Some(dependent) = gen.statement_code(id, &format!("DEP{}", n))? {
            dependents.push(dependent);
        }
    }
    let list = if dependents.is_empty() {
        "[]".to_string()
    } else {
        format!("[\n{}\n]", gen.indent(&dependents.join(",\n")))
    };
    Ok(Generated::Statement(format!(
        "with_dependents(\n{}\n)",
        gen.indent(&format!("{},\n{}", stack, list))
    )))
}
