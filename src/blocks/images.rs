//! Image processing on camera frames. The emitted calls go to the runtime's
//! `image` module.

use super::{BlockType, Catalog};
use crate::codegen::{CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::Result;
use crate::workspace::{BlockId, InputTemplate};

const NO_IMAGE: &str = "None";

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    catalog.register(
        BlockType::value("image_findcolour", &["Image"])
            .field("OP", "RED")
            .input(InputTemplate::value("INPUT").check("Image").label("select")),
    );
    catalog.register(
        BlockType::value("image_threshold", &["Image"])
            .field("THRESHOLD", "0")
            .input(InputTemplate::value("INPUT").check("Image").label("threshold")),
    );
    catalog.register(
        BlockType::value("image_erode", &["Image"])
            .input(InputTemplate::value("INPUT").check("Image").label("erode")),
    );
    catalog.register(
        BlockType::value("image_tonumber", &["Number"])
            .field("OP", "CENTROIDX")
            .input(InputTemplate::value("INPUT").check("Image").label("calculate")),
    );

    generators.register("image_findcolour", image_findcolour);
    generators.register("image_threshold", image_threshold);
    generators.register("image_erode", image_erode);
    generators.register("image_tonumber", image_tonumber);
}

fn call(function: &str, args: &[&str]) -> Generated {
    Generated::Expression(
        format!("image.{}({})", function, args.join(", ")),
        Order::FUNCTION_CALL,
    )
}

fn image_findcolour(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let input = gen.value_or(id, "INPUT", Order::NONE, NO_IMAGE)?;
    let colour = format!("\"{}\"", gen.field(id, "OP")?.to_lowercase());
    Ok(call("select", &[input.as_str(), colour.as_str()]))
}

fn image_threshold(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let input = gen.value_or(id, "INPUT", Order::NONE, NO_IMAGE)?;
    let raw = gen.field(id, "THRESHOLD")?;
    let level = match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value.trunc() as i64,
        _ => {
            tracing::warn!(block = %id, value = raw, "threshold does not parse, using 0");
            0
        }
    };
    Ok(call("threshold", &[input.as_str(), level.to_string().as_str()]))
}

fn image_erode(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let input = gen.value_or(id, "INPUT", Order::NONE, NO_IMAGE)?;
    Ok(call("erode", &[input.as_str()]))
}

fn image_tonumber(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let input = gen.value_or(id, "INPUT", Order::NONE, NO_IMAGE)?;
    let measure = format!("\"{}\"", gen.field(id, "OP")?);
    Ok(call("calculate", &[input.as_str(), measure.as_str()]))
}
