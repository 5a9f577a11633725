use super::{BlockType, Catalog};
use crate::codegen::{prefix_lines, CodeGenerator, Generated, GeneratorRegistry};
use crate::error::Result;
use crate::workspace::{BlockId, InputTemplate};

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(
        BlockType::top("procedures_namedsequence")
            .field("NAME", "do something")
            .input(InputTemplate::statement("STACK")),
    );
    catalog.register(BlockType::statement("procedures_callnamedsequence").field("NAME", ""));

    generators.register("procedures_namedsequence", procedures_namedsequence);
    generators.register("procedures_callnamedsequence", procedures_callnamedsequence);
}

fn procedures_namedsequence(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let name = gen.procedure_name(gen.field(id, "NAME")?);
    let mut branch = gen.statement_or(id, "STACK", "sequence()")?;
    if let Some(prefix) = gen.statement_prefix(id)? {
        branch = format!("{}{}", prefix_lines(&prefix, &gen.options().indent), branch);
    }
    Ok(Generated::Statement(format!("{} = {}", name, branch)))
}

fn procedures_callnamedsequence(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let name = gen.procedure_name(gen.field(id, "NAME")?);
    Ok(Generated::Statement(name))
}
