use super::{BlockType, Catalog, Declaration};
use crate::codegen::{CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::Result;
use crate::scope::VariableFilter;
use crate::workspace::{BlockId, InputTemplate};

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(
        BlockType::top("global_declaration")
            .field("NAME", "x")
            .input(InputTemplate::value("VALUE").label("initialise global"))
            .declares(Declaration::global("NAME", "global")),
    );
    catalog.register(
        BlockType::value("lexical_variable_get", &[])
            .references("VAR", VariableFilter::default()),
    );
    catalog.register(
        BlockType::statement("lexical_variable_set")
            .references("VAR", VariableFilter::default().writable())
            .input(InputTemplate::value("VALUE").label("to"))
            .typed_input("VALUE"),
    );
    catalog.register(
        BlockType::statement("local_declaration_statement")
            .field("NAME", "name")
            .input(InputTemplate::value("VALUE").label("initialise local"))
            .input(InputTemplate::statement("STACK").label("in"))
            .declares(Declaration::lexical("NAME", &["STACK"])),
    );

    generators.register("global_declaration", global_declaration);
    generators.register("lexical_variable_get", lexical_variable_get);
    generators.register("lexical_variable_set", lexical_variable_set);
    generators.register("local_declaration_statement", local_declaration_statement);
}

fn global_declaration(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, "0")?;
    let name = gen.declared_name(id);
    Ok(Generated::Statement(format!("{} = variable({})", name, value)))
}

fn lexical_variable_get(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    Ok(Generated::Expression(gen.reference_name(id), Order::ATOMIC))
}

fn lexical_variable_set(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, "0")?;
    let name = gen.reference_name(id);
    Ok(Generated::Statement(format!("set({}, {})", name, value)))
}

/// The local is created as a top-level definition; the block itself runs
/// its body.
fn local_declaration_statement(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let value = gen.value_or(id, "VALUE", Order::NONE, "0")?;
    let name = gen.declared_name(id);
    gen.add_definition(&name, format!("{} = variable({})", name, value));
    let body = gen.statement_or(id, "STACK", "sequence()")?;
    Ok(Generated::Statement(body))
}
