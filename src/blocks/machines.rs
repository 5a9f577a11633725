//! Device declarations and the connections they are driven through.
//!
//! Every machine block declares a read-only `component` global in the
//! `machine` namespace whose attributes mirror the device's readable and
//! settable properties.

use super::{AttributeSpec, BlockType, Catalog, CountedAttributes, Declaration};
use crate::codegen::{format_number, CodeGenerator, Generated, GeneratorRegistry, Order};
use crate::error::{EditorError, Result};
use crate::mutation::MutationSchema;
use crate::workspace::{Align, BlockId, InputTemplate};

const OPTIONS_CONTAINER: &str = "machine_quark";
const ON_OFF: &[&str] = &["off", "on"];

/// Static description of one supported device.
pub struct MachineSpec {
    pub block_type: &'static str,
    pub title: &'static str,
    pub default_name: &'static str,
    /// `module.Class` constructed by the emitted code.
    pub class: &'static str,
    pub connection: &'static str,
    pub flags: &'static [&'static str],
    pub attributes: fn() -> Vec<AttributeSpec>,
    /// Numeric constructor options, with their defaults.
    pub options: &'static [(&'static str, &'static str)],
    pub counted: Option<CountedAttributes>,
}

pub const MACHINES: &[MachineSpec] = &[
    MachineSpec {
        block_type: "machine_vapourtec_R2R4",
        title: "Vapourtec R2+/R4",
        default_name: "reactor",
        class: "vapourtec.R2R4",
        connection: "MachineConnection",
        flags: &["providesGSIOC"],
        attributes: r2r4_attributes,
        options: &[],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_knauer_K120",
        title: "Knauer K120",
        default_name: "pump",
        class: "knauer.K120",
        connection: "MachineConnection",
        flags: &[],
        attributes: k120_attributes,
        options: &[],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_knauer_S100",
        title: "Knauer S100",
        default_name: "pump",
        class: "knauer.S100",
        connection: "MachineConnection",
        flags: &[],
        attributes: s100_attributes,
        options: &[],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_vici_multivalve",
        title: "VICI multi-position valve",
        default_name: "valve",
        class: "vici.MultiValve",
        connection: "MachineConnection",
        flags: &[],
        attributes: multivalve_attributes,
        options: &[("num_positions", "0")],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_wpi_aladdin",
        title: "WPI Aladdin syringe pump",
        default_name: "pump",
        class: "wpi.Aladdin",
        connection: "MachineConnection",
        flags: &[],
        attributes: aladdin_attributes,
        options: &[("syringe_diameter", "0")],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_mt_sics_balance",
        title: "MT Balance (SICS)",
        default_name: "balance",
        class: "mt.SICS",
        connection: "MachineConnection",
        flags: &[],
        attributes: balance_attributes,
        options: &[],
        counted: None,
    },
    MachineSpec {
        block_type: "machine_multitracker",
        title: "Multi Tracker",
        default_name: "tracker",
        class: "tracker.MultiTracker",
        connection: "CameraConnection",
        flags: &[],
        attributes: Vec::new,
        options: &[("count", "0")],
        counted: Some(CountedAttributes {
            option: "count",
            name: "height%",
            title: "Height #%",
            var_type: "Number",
            readonly: true,
        }),
    },
];

pub fn machine(block_type: &str) -> Option<&'static MachineSpec> {
    MACHINES.iter().find(|spec| spec.block_type == block_type)
}

fn r2r4_attributes() -> Vec<AttributeSpec> {
    let mut attributes = vec![
        AttributeSpec::new("status", "Status", "String").readonly(),
        AttributeSpec::new("power", "Power", "String").options(ON_OFF),
        AttributeSpec::new("loop1", "Loop A", "String").options(&["load", "inject"]),
        AttributeSpec::new("loop2", "Loop B", "String").options(&["load", "inject"]),
        AttributeSpec::new("pressure_limit", "Pressure Limit", "Number").unit("mbar"),
        AttributeSpec::new("pressure", "System Pressure", "Number").readonly(),
        AttributeSpec::new("output", "Output", "String").options(&["waste", "collect"]),
    ];
    for (n, letter) in ["A", "B"].iter().enumerate() {
        attributes.push(AttributeSpec::group(
            format!("pump{}", n + 1),
            format!("Pump {}", letter),
            vec![
                AttributeSpec::new("target", "Target", "Number").unit("uL/min"),
                AttributeSpec::new("rate", "Flow Rate", "Number").readonly(),
                AttributeSpec::new("pressure", "Pressure", "Number").readonly(),
                AttributeSpec::new("input", "Input", "String").options(&["solvent", "reagent"]),
                AttributeSpec::new("airlock", "Airlock", "Number").readonly(),
            ],
        ));
    }
    for (n, letter) in ["A", "B", "C", "D"].iter().enumerate() {
        attributes.push(AttributeSpec::group(
            format!("heater{}", n + 1),
            format!("Heater {}", letter),
            vec![
                AttributeSpec::new("target", "Target", "Number").unit("C"),
                AttributeSpec::new("temp", "Temperature", "Number").readonly(),
                AttributeSpec::new("mode", "Mode", "Number").readonly(),
                AttributeSpec::new("power", "Power", "Number").readonly(),
            ],
        ));
    }
    attributes
}

fn k120_attributes() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::new("status", "Status", "String").readonly(),
        AttributeSpec::new("power", "Power", "String").options(ON_OFF),
        AttributeSpec::new("target", "Target", "Number").unit("uL/min"),
        AttributeSpec::new("rate", "Flow Rate", "Number").readonly(),
    ]
}

fn s100_attributes() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::new("status", "Status", "String").readonly(),
        AttributeSpec::new("power", "Power", "String").options(ON_OFF),
        AttributeSpec::new("target", "Target", "Number").unit("uL/min"),
        AttributeSpec::new("pressure", "Pressure", "Number").readonly(),
        AttributeSpec::new("rate", "Flow Rate", "Number").readonly(),
    ]
}

fn multivalve_attributes() -> Vec<AttributeSpec> {
    vec![AttributeSpec::new("position", "Position", "Number")]
}

fn aladdin_attributes() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::new("status", "Status", "String").readonly(),
        AttributeSpec::new("rate", "Flow rate", "Number").unit("uL/min"),
        AttributeSpec::new("direction", "Direction", "String").options(&["infuse", "withdraw"]),
        AttributeSpec::new("dispensed", "Dispensed volume", "Number").readonly(),
        AttributeSpec::new("withdrawn", "Withdrawn volume", "Number").readonly(),
    ]
}

fn balance_attributes() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::new("status", "Status", "String").readonly(),
        AttributeSpec::new("weight", "Weight", "Number").readonly(),
    ]
}

pub fn register(catalog: &mut Catalog, generators: &mut GeneratorRegistry) {
    for spec in MACHINES {
        let mut declaration = Declaration::global("NAME", "machine")
            .of_type("component")
            .readonly()
            .flags(spec.flags)
            .attributes((spec.attributes)());
        if let Some(counted) = &spec.counted {
            declaration = declaration.counted(counted.clone());
        }
        let mut block_type = BlockType::top(spec.block_type)
            .field("NAME", spec.default_name)
            .input(
                InputTemplate::value("CONNECTION")
                    .check(spec.connection)
                    .align(Align::Right)
                    .label("connection"),
            )
            .declares(declaration);
        if !spec.options.is_empty() {
            let schema = spec
                .options
                .iter()
                .fold(MutationSchema::new(OPTIONS_CONTAINER), |schema, &(name, default)| {
                    schema.option(name, default)
                });
            block_type = block_type.mutation(schema);
        }
        catalog.register(block_type);
        generators.register(spec.block_type, machine_declaration);
    }

    catalog.register(
        BlockType::value("connection_tcp", &["MachineConnection"])
            .field("HOST", "192.168.15.100")
            .field("PORT", "9000"),
    );
    catalog.register(
        BlockType::value("connection_serial", &["MachineConnection"])
            .field("PORT", "/dev/ttyS0")
            .field("BAUD", "19200"),
    );
    generators.register("connection_tcp", connection_tcp);
    generators.register("connection_serial", connection_serial);
}

fn machine_declaration(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let block = gen.block(id)?;
    let spec = machine(&block.block_type)
        .ok_or_else(|| EditorError::UnsupportedBlock(block.block_type.clone()))?;
    let name = gen.declared_name(id);
    let alias = gen
        .variables()
        .declared_by(id)
        .and_then(|variable| gen.variables().get(variable))
        .map(|variable| variable.name.clone())
        .unwrap_or_else(|| "_".to_string());
    let connection = gen.value_or(id, "CONNECTION", Order::NONE, "dummy()")?;

    let mut arguments = vec![connection, format!("alias = {}", gen.quote(&alias))];
    for &(option, default) in spec.options {
        let raw = block.mutation().option(option).unwrap_or(default);
        let value = match raw.trim().parse::<f64>() {
            Ok(number) => format_number(number),
            Err(_) => gen.quote(raw),
        };
        arguments.push(format!("{} = {}", option, value));
    }
    Ok(Generated::Statement(format!(
        "{} = {}({})",
        name,
        spec.class,
        arguments.join(", ")
    )))
}

fn connection_tcp(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let host = gen.field(id, "HOST")?;
    let port = integer_field(gen.field(id, "PORT")?);
    Ok(Generated::Expression(
        format!("tcp({}, {})", gen.quote(host), port),
        Order::FUNCTION_CALL,
    ))
}

fn connection_serial(gen: &mut CodeGenerator<'_>, id: BlockId) -> Result<Generated> {
    let port = gen.field(id, "PORT")?;
    let baud = integer_field(gen.field(id, "BAUD")?);
    Ok(Generated::Expression(
        format!("serial({}, baudrate = {})", gen.quote(port), baud),
        Order::FUNCTION_CALL,
    ))
}

/// Leading integer of a numeric field, `0` when there is none.
fn integer_field(raw: &str) -> i64 {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    match trimmed[..end].parse() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!(value = %raw, "non-numeric connection setting, using 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_fields_parse_leniently() {
        assert_eq!(integer_field("9000"), 9000);
        assert_eq!(integer_field(" 19200baud"), 19200);
        assert_eq!(integer_field("-3"), -3);
        assert_eq!(integer_field("fast"), 0);
    }

    #[test]
    fn reactor_attribute_tree_matches_device() {
        let attributes = r2r4_attributes();
        assert_eq!(attributes.len(), 13);
        let pump = attributes.iter().find(|a| a.name == "pump2").unwrap();
        assert_eq!(pump.title, "Pump B");
        assert!(pump.readonly);
        assert_eq!(pump.parts.len(), 5);
        let heater = attributes.iter().find(|a| a.name == "heater4").unwrap();
        assert_eq!(heater.title, "Heater D");
    }
}
