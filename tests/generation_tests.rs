//! Generation Integration Tests
//!
//! Tests for:
//! - End to end generation: features, keywords, per-pass properties
//! - Hook overrides switching template features
//! - Emission idempotence on a prepared template
//! - Stamp round trip: stored configuration, edit detection
//! - Error surfacing: non-fatal placeholders, fatal unknown properties,
//!   sampling order cycles

use shadergen::codegen::stamped_config;
use shadergen::{
    verify_stamp, Diagnostics, GeneratorConfig, Implementation, ImplementationKind, ModuleLibrary, ShaderGenError,
    ShaderGenerator,
};

const RIM_TEMPLATE: &str = "\
#ID=RIM
#PROPERTIES_NEW
float\tRim Min\tfragment, imp(range, default = 0.5, min = 0, max = 1)
float\tRim Max\tfragment, imp(range, default = 1, min = 0, max = 1)
float\tRim Hook\tfragment, toggles = USE_RIM_HOOK, imp(hook)
#END
Shader \"@%SHADER_NAME%@\"
{
\tProperties
\t{
\t\t[[PROPERTIES]]
\t}
#PASS
\tCGPROGRAM
\t\t[[VARIABLES]]
#FRAGMENT, INPUT=input
\t\t[[SAMPLE_SHADER_PROPERTIES]]
/// IF RIM
\t\tfloat rim = smoothstep([[VALUE:Rim Min]], [[VALUE:Rim Max]], ndv);
///
/// IF USE_RIM_HOOK
\t\trim_hook();
///
\tENDCG
#PASS
\tCGPROGRAM
\t\t[[VARIABLES]]
\t\tfloat outline = 1;
\tENDCG
}";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn generate(config: &GeneratorConfig) -> String {
    init_logger();
    let output = ShaderGenerator::default().generate(RIM_TEMPLATE, config);
    assert!(output.is_success(), "{:?}", output.messages());
    output.source.unwrap()
}

// ============================================================================
// Generation
// ============================================================================

#[test]
fn generation_resolves_values_and_keywords() {
    let source = generate(&GeneratorConfig::new("Toon/Rim").with_features(["RIM"]));

    assert!(source.starts_with("Shader \"Toon/Rim\"\n"));
    assert!(source.contains("smoothstep(__rimMin, __rimMax, ndv)"));
    assert!(source.contains("float __rimMin = ( _RimMin );"));
    assert!(!source.contains("[["));
    assert!(!source.contains("/// IF"));
    assert!(!source.contains("#PASS"));
}

#[test]
fn generation_declares_variables_per_pass() {
    let source = generate(&GeneratorConfig::new("Toon/Rim").with_features(["RIM"]));

    // only the first pass reads the rim values
    assert_eq!(source.matches("float _RimMin;").count(), 1);
    assert_eq!(source.matches("float _RimMax;").count(), 1);
    assert!(source.contains("float outline = 1;"));
}

#[test]
fn generation_without_features_drops_unused_properties() {
    let source = generate(&GeneratorConfig::new("Toon/Plain"));

    assert!(!source.contains("_RimMin"));
    assert!(!source.contains("smoothstep"));
    assert!(!source.contains("rim_hook"));
}

#[test]
fn generation_hook_override_enables_toggles() {
    let plain = generate(&GeneratorConfig::new("Toon/Hook"));
    assert!(!plain.contains("rim_hook();"));

    let config = GeneratorConfig::new("Toon/Hook").with_implementations(
        "Rim Hook",
        vec![Implementation::new(ImplementationKind::ConstantFloat { value: 2.0 })],
    );
    let hooked = generate(&config);
    assert!(hooked.contains("\t\trim_hook();"));
}

#[test]
fn generation_reports_template_header() {
    let output = ShaderGenerator::default().generate(RIM_TEMPLATE, &GeneratorConfig::new("X"));
    assert_eq!(output.header.id.as_deref(), Some("RIM"));
}

#[test]
fn generation_with_modules() -> anyhow::Result<()> {
    let mut modules = ModuleLibrary::new();
    modules.load("Outline", "#VARIABLES\nfloat _OutlineWidth;\n#END")?;
    let template = "#MODULES\nOutline\n#END\n#PASS\nCGPROGRAM\n\t[[MODULE:VARIABLES]]\nENDCG";

    let output = ShaderGenerator::new(modules).generate(template, &GeneratorConfig::new("X"));
    let source = output.source.ok_or_else(|| anyhow::anyhow!("{:?}", output.diagnostics.messages()))?;
    assert!(source.starts_with("CGPROGRAM\n\tfloat _OutlineWidth;\nENDCG\n"));
    Ok(())
}

// ============================================================================
// Idempotence & Stamp
// ============================================================================

#[test]
fn emit_is_idempotent() {
    init_logger();
    let config = GeneratorConfig::new("Toon/Rim").with_features(["RIM"]);
    let generator = ShaderGenerator::default();
    let mut diagnostics = Diagnostics::new();
    let prepared = generator.prepare(RIM_TEMPLATE, &config, &mut diagnostics).unwrap();

    let first = prepared.emit(&mut Diagnostics::new()).unwrap();
    let second = prepared.emit(&mut Diagnostics::new()).unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn stamp_round_trips_configuration() {
    let base = GeneratorConfig::new("Toon/Rim").with_features(["RIM"]);
    let json = base.to_json().unwrap();
    let config = base.clone().with_serialized(json.clone());

    let source = generate(&config);
    assert_eq!(verify_stamp(&source, &config.format), Some(true));

    let stored = stamped_config(&source, &config.format).unwrap();
    assert_eq!(stored, json);
    assert_eq!(GeneratorConfig::from_json(stored).unwrap(), base);

    let value: serde_json::Value = serde_json::from_str(stored).unwrap();
    assert_eq!(value["shader_name"], "Toon/Rim");
}

#[test]
fn stamp_detects_external_edits() {
    let config = GeneratorConfig::new("Toon/Rim").with_features(["RIM"]);
    let source = generate(&config);

    assert_eq!(verify_stamp(&source.replace('\n', "\r\n"), &config.format), Some(true));
    let edited = source.replace("smoothstep", "lerp");
    assert_eq!(verify_stamp(&edited, &config.format), Some(false));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn unknown_tag_is_a_visible_placeholder() {
    let output = ShaderGenerator::default().generate("#PASS\nx = [[NOT_A_TAG]];", &GeneratorConfig::new("X"));

    let source = output.source.clone().unwrap();
    assert!(source.starts_with("x = /* UNKNOWN_TAG:NOT_A_TAG */;\n"));
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.messages()[0].1, Some(2));
}

#[test]
fn unknown_property_aborts_generation() {
    let template = "#PROPERTIES_NEW\nfloat\tA\tfragment, imp(constant_float)\n#END\n#PASS\nx = [[VALUE:B]];";
    let output = ShaderGenerator::default().generate(template, &GeneratorConfig::new("X"));

    assert!(output.source.is_none());
    assert!(output.diagnostics.has_fatal());
    assert!(output.messages().iter().any(|(_, line)| *line == Some(5)));
}

#[test]
fn unterminated_condition_is_reported_with_output() {
    let output = ShaderGenerator::default().generate("#PASS\n/// IF A\nkept\n", &GeneratorConfig::new("X"));

    assert!(output.is_success());
    assert!(!output.diagnostics.is_empty());
    assert!(!output.source.unwrap().contains("kept"));
}

#[test]
fn sampling_order_cycle_aborts_generation() {
    init_logger();
    let config = GeneratorConfig::new("Toon/Rim").with_features(["RIM"]);
    let generator = ShaderGenerator::default();
    let mut diagnostics = Diagnostics::new();
    let mut prepared = generator.prepare(RIM_TEMPLATE, &config, &mut diagnostics).unwrap();
    assert!(prepared.render(&mut Diagnostics::new()).is_some());

    // a cycle the link-time checks would have refused
    let graph = &mut prepared.context.graph;
    let min = graph.id_of("Rim Min").unwrap();
    let max = graph.id_of("Rim Max").unwrap();
    graph.link_reference(max, min).unwrap();
    graph.force_edge(min, max);

    let mut diagnostics = Diagnostics::new();
    assert!(prepared.render(&mut diagnostics).is_none());
    assert!(diagnostics.has_fatal());
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d.error, ShaderGenError::SamplingOrderCycle(_)) && d.line.is_none()));
    assert!(matches!(prepared.emit(&mut Diagnostics::new()), Err(ShaderGenError::SamplingOrderCycle(_))));
}
