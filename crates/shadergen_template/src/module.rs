//! Template Modules
//!
//! A module is a named, reusable chunk of template text split in sections:
//!
//! ```text
//! #FEATURES / #PROPERTIES_NEW / #KEYWORDS / #PROPERTIES_BLOCK
//! #SHADER_FEATURES_BLOCK / #FUNCTIONS / #VARIABLES / #INPUT
//! #VERTEX[:key](float3 normal, ...)
//! #FRAGMENT[:key](type arg, ...)      (#LIGHTING is an alias)
//! #END
//! ```
//!
//! Templates splice sections with `[[MODULE:KIND:name]]` markers; see
//! [`ModuleMarker`]. Vertex and fragment sections are functions: their
//! parameter names are replaced, as whole words, by the marker arguments.

use regex::{NoExpand, Regex};
use rustc_hash::FxHashMap;
use shadergen_core::{Result, ShaderGenError};

/// Plain (argument-less) module sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleBlock {
    Features,
    PropertiesNew,
    Keywords,
    PropertiesBlock,
    ShaderFeaturesBlock,
    Functions,
    Variables,
    Input,
}

impl ModuleBlock {
    fn from_header(header: &str) -> Option<Self> {
        Some(match header {
            "#FEATURES" => Self::Features,
            "#PROPERTIES_NEW" => Self::PropertiesNew,
            "#KEYWORDS" => Self::Keywords,
            "#PROPERTIES_BLOCK" => Self::PropertiesBlock,
            "#SHADER_FEATURES_BLOCK" => Self::ShaderFeaturesBlock,
            "#FUNCTIONS" => Self::Functions,
            "#VARIABLES" => Self::Variables,
            "#INPUT" => Self::Input,
            _ => return None,
        })
    }

    fn from_marker(kind: &str) -> Option<Self> {
        Some(match kind {
            "FEATURES" => Self::Features,
            "PROPERTIES_NEW" => Self::PropertiesNew,
            "KEYWORDS" => Self::Keywords,
            "PROPERTIES_BLOCK" => Self::PropertiesBlock,
            "SHADER_FEATURES_BLOCK" => Self::ShaderFeaturesBlock,
            "FUNCTIONS" => Self::Functions,
            "VARIABLES" => Self::Variables,
            "INPUT" => Self::Input,
            _ => return None,
        })
    }
}

/// `float3 normal` in a `#VERTEX(...)` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArgument {
    pub type_name: String,
    pub name: String,
}

/// A `#VERTEX` or `#FRAGMENT` section with its declared parameters.
#[derive(Debug, Clone, Default)]
pub struct ModuleFunction {
    pub arguments: Vec<ModuleArgument>,
    pub lines: Vec<String>,
}

impl ModuleFunction {
    /// Lines with every parameter replaced by the matching argument.
    pub fn lines_with_arguments(&self, module: &str, arguments: &[String]) -> Result<Vec<String>> {
        if self.arguments.is_empty() {
            return Ok(self.lines.clone());
        }
        if arguments.len() != self.arguments.len() {
            return Err(ShaderGenError::ModuleArgumentMismatch {
                module: module.to_string(),
                expected: self.arguments.len(),
                found: arguments.len(),
            });
        }

        let mut substitutions = Vec::with_capacity(self.arguments.len());
        for (param, value) in self.arguments.iter().zip(arguments) {
            let pattern = format!(r"\b{}\b", regex::escape(&param.name));
            let re = Regex::new(&pattern)
                .map_err(|_| ShaderGenError::InvalidModuleMarker(param.name.clone()))?;
            substitutions.push((re, value.as_str()));
        }

        Ok(self
            .lines
            .iter()
            .map(|line| {
                substitutions
                    .iter()
                    .fold(line.clone(), |acc, (re, value)| {
                        re.replace_all(&acc, NoExpand(value)).into_owned()
                    })
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Block(ModuleBlock),
    Vertex,
    Fragment,
}

/// A parsed module file.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    blocks: FxHashMap<ModuleBlock, Vec<String>>,
    vertex: FxHashMap<String, ModuleFunction>,
    fragment: FxHashMap<String, ModuleFunction>,
}

impl Module {
    /// Parses module source text. Lines outside any section are ignored.
    pub fn parse(name: &str, source: &str) -> Result<Module> {
        let mut module = Module {
            name: name.to_string(),
            ..Default::default()
        };
        let mut current: Option<(Section, String)> = None;

        for line in source.lines() {
            if line.starts_with('#') && !line.contains("_IMPL") {
                let header = line.trim();
                if let Some(rest) = header.strip_prefix("#VERTEX") {
                    let (key, function) = parse_function_header(name, rest)?;
                    module.vertex.insert(key.clone(), function);
                    current = Some((Section::Vertex, key));
                } else if let Some(rest) = header
                    .strip_prefix("#FRAGMENT")
                    .or_else(|| header.strip_prefix("#LIGHTING"))
                {
                    let (key, function) = parse_function_header(name, rest)?;
                    module.fragment.insert(key.clone(), function);
                    current = Some((Section::Fragment, key));
                } else if header == "#END" {
                    current = None;
                } else if let Some(block) = ModuleBlock::from_header(header) {
                    module.blocks.entry(block).or_default();
                    current = Some((Section::Block(block), String::new()));
                } else {
                    log::debug!("Module '{name}': ignoring header '{header}'");
                }
                continue;
            }

            match &current {
                Some((Section::Block(block), _)) => {
                    module.blocks.entry(*block).or_default().push(line.to_string());
                }
                Some((Section::Vertex, key)) => {
                    if let Some(f) = module.vertex.get_mut(key) {
                        f.lines.push(line.to_string());
                    }
                }
                Some((Section::Fragment, key)) => {
                    if let Some(f) = module.fragment.get_mut(key) {
                        f.lines.push(line.to_string());
                    }
                }
                None => {}
            }
        }

        for lines in module.blocks.values_mut() {
            remove_minimum_indentation(lines);
        }
        for function in module.vertex.values_mut().chain(module.fragment.values_mut()) {
            remove_minimum_indentation(&mut function.lines);
        }
        Ok(module)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lines of a plain section; empty when the module doesn't define it.
    #[must_use]
    pub fn block(&self, block: ModuleBlock) -> &[String] {
        self.blocks.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn vertex_lines(&self, key: &str, arguments: &[String]) -> Result<Vec<String>> {
        self.function_lines(&self.vertex, "VERTEX", key, arguments)
    }

    pub fn fragment_lines(&self, key: &str, arguments: &[String]) -> Result<Vec<String>> {
        self.function_lines(&self.fragment, "FRAGMENT", key, arguments)
    }

    fn function_lines(
        &self,
        functions: &FxHashMap<String, ModuleFunction>,
        kind: &str,
        key: &str,
        arguments: &[String],
    ) -> Result<Vec<String>> {
        match functions.get(key) {
            Some(function) => function.lines_with_arguments(&self.name, arguments),
            // A module without any such section splices nothing.
            None if key.is_empty() && functions.is_empty() => Ok(Vec::new()),
            None => Err(ShaderGenError::ModuleBlockNotFound {
                module: self.name.clone(),
                block: if key.is_empty() {
                    kind.to_string()
                } else {
                    format!("{kind}:{key}")
                },
            }),
        }
    }
}

/// `":key(float3 a, float b)"` -> (`"key"`, function with two arguments).
fn parse_function_header(module: &str, rest: &str) -> Result<(String, ModuleFunction)> {
    let (head, args) = match rest.find('(') {
        Some(open) => {
            let close = rest
                .rfind(')')
                .filter(|&c| c > open)
                .ok_or_else(|| ShaderGenError::InvalidModuleMarker(format!("{module}: {rest}")))?;
            (&rest[..open], Some(&rest[open + 1..close]))
        }
        None => (rest, None),
    };
    let key = head.trim().trim_start_matches(':').trim().to_string();

    let mut arguments = Vec::new();
    for arg in args.unwrap_or("").split(',') {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        let Some((type_name, name)) = arg.rsplit_once(char::is_whitespace) else {
            return Err(ShaderGenError::InvalidModuleMarker(format!("{module}: {arg}")));
        };
        arguments.push(ModuleArgument {
            type_name: type_name.trim().to_string(),
            name: name.trim().to_string(),
        });
    }

    Ok((
        key,
        ModuleFunction {
            arguments,
            lines: Vec::new(),
        },
    ))
}

/// Lines the indentation pass leaves alone: directives and marker lines.
fn is_indent_exempt(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("///")
        || (trimmed.starts_with('#') && (trimmed.contains("_IMPL") || trimmed.contains("not_empty")))
}

/// Removes the smallest common count of leading tabs.
fn remove_minimum_indentation(lines: &mut [String]) {
    let min = lines
        .iter()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#') && !is_indent_exempt(l))
        .map(|l| l.chars().take_while(|&c| c == '\t').count())
        .min()
        .unwrap_or(0);
    if min == 0 {
        return;
    }

    for line in lines.iter_mut() {
        if is_indent_exempt(line) {
            continue;
        }
        let tabs = line.chars().take_while(|&c| c == '\t').count().min(min);
        line.drain(..tabs);
    }
}

/// What a `[[MODULE:...]]` marker asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Block(ModuleBlock),
    Vertex,
    Fragment,
}

/// A parsed `[[MODULE:KIND[:name[:key]][(args)]]]` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMarker {
    pub kind: MarkerKind,
    /// `None` splices the block from every listed module.
    pub module: Option<String>,
    pub key: String,
    pub arguments: Vec<String>,
}

impl ModuleMarker {
    pub const PREFIX: &'static str = "[[MODULE:";

    /// `Ok(None)` when the line isn't a module marker line.
    pub fn parse(line: &str) -> Result<Option<ModuleMarker>> {
        let trimmed = line.trim();
        if !trimmed.starts_with(Self::PREFIX) {
            return Ok(None);
        }
        let invalid = || ShaderGenError::InvalidModuleMarker(trimmed.to_string());

        let end = trimmed.rfind("]]").ok_or_else(invalid)?;
        let tag = trimmed.get(Self::PREFIX.len()..end).ok_or_else(invalid)?;

        let (path, arguments) = match tag.find('(') {
            Some(open) => {
                let close = tag.rfind(')').filter(|&c| c > open).ok_or_else(invalid)?;
                let args = tag[open + 1..close]
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
                (&tag[..open], args)
            }
            None => (tag, Vec::new()),
        };

        let mut parts = path.splitn(3, ':');
        let kind_str = parts.next().unwrap_or_default().trim();
        let module = parts
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let key = parts.next().unwrap_or_default().trim().to_string();

        let kind = match kind_str {
            "VERTEX" => MarkerKind::Vertex,
            "FRAGMENT" | "LIGHTING" => MarkerKind::Fragment,
            other => MarkerKind::Block(ModuleBlock::from_marker(other).ok_or_else(invalid)?),
        };
        if matches!(kind, MarkerKind::Vertex | MarkerKind::Fragment) && module.is_none() {
            return Err(invalid());
        }

        Ok(Some(ModuleMarker {
            kind,
            module,
            key,
            arguments,
        }))
    }
}

/// Loaded modules, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct ModuleLibrary {
    modules: FxHashMap<String, Module>,
}

impl ModuleLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Parses `source` and registers it under `name`.
    pub fn load(&mut self, name: &str, source: &str) -> Result<()> {
        let module = Module::parse(name, source)?;
        self.insert(module);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIM_MODULE: &str = "\
#FEATURES
mult\tlbl=\"Rim\"\tkw=RIM
#END

#VARIABLES
\t\tfloat _RimMin;
\t\t/// IF RIM_DIR
\t\tfloat4 _RimDir;
\t\t///
#END

#FRAGMENT(float3 normal, float3 viewDir)
\thalf rim = 1 - saturate(dot(normal, viewDir));
\t\trim = smoothstep(_RimMin, 1, rim);
#END

#VERTEX:outline(float4 vertex)
\tvertex.xyz += 0.1;
#END
";

    #[test]
    fn test_parse_sections() {
        let module = Module::parse("Rim", RIM_MODULE).unwrap();
        assert_eq!(module.name(), "Rim");
        assert_eq!(module.block(ModuleBlock::Features), ["mult\tlbl=\"Rim\"\tkw=RIM"]);
        assert_eq!(
            module.block(ModuleBlock::Variables),
            ["float _RimMin;", "\t\t/// IF RIM_DIR", "float4 _RimDir;", "\t\t///"]
        );
        assert!(module.block(ModuleBlock::Input).is_empty());
    }

    #[test]
    fn test_function_arguments_whole_word() {
        let module = Module::parse("Rim", RIM_MODULE).unwrap();
        let lines = module
            .fragment_lines("", &["input.normal".into(), "viewDir".into()])
            .unwrap();
        assert_eq!(
            lines,
            vec![
                "half rim = 1 - saturate(dot(input.normal, viewDir));",
                "\trim = smoothstep(_RimMin, 1, rim);",
            ]
        );

        let outline = module.vertex_lines("outline", &["v.vertex".into()]).unwrap();
        assert_eq!(outline, vec!["v.vertex.xyz += 0.1;"]);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let module = Module::parse("Rim", RIM_MODULE).unwrap();
        let err = module.fragment_lines("", &["n".into()]).unwrap_err();
        assert_eq!(
            err,
            ShaderGenError::ModuleArgumentMismatch {
                module: "Rim".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_missing_keyed_function() {
        let module = Module::parse("Rim", RIM_MODULE).unwrap();
        assert!(matches!(
            module.vertex_lines("nope", &[]),
            Err(ShaderGenError::ModuleBlockNotFound { .. })
        ));
        // no default #VERTEX but a keyed one exists
        assert!(module.vertex_lines("", &[]).is_err());
    }

    #[test]
    fn test_marker_parse() {
        let m = ModuleMarker::parse("\t\t[[MODULE:FRAGMENT:Rim(input.normal, viewDir)]]")
            .unwrap()
            .unwrap();
        assert_eq!(m.kind, MarkerKind::Fragment);
        assert_eq!(m.module.as_deref(), Some("Rim"));
        assert_eq!(m.arguments, vec!["input.normal", "viewDir"]);

        let m = ModuleMarker::parse("[[MODULE:VERTEX:Outline:outline(v.vertex)]]")
            .unwrap()
            .unwrap();
        assert_eq!(m.key, "outline");

        let m = ModuleMarker::parse("[[MODULE:VARIABLES]]").unwrap().unwrap();
        assert_eq!(m.kind, MarkerKind::Block(ModuleBlock::Variables));
        assert_eq!(m.module, None);

        assert!(ModuleMarker::parse("float a;").unwrap().is_none());
        assert!(ModuleMarker::parse("[[MODULE:BOGUS:Rim]]").is_err());
        assert!(ModuleMarker::parse("[[MODULE:VERTEX]]").is_err());
    }

    #[test]
    fn test_library() {
        let mut library = ModuleLibrary::new();
        library.load("Rim", RIM_MODULE).unwrap();
        assert!(library.contains("Rim"));
        assert_eq!(library.len(), 1);
        assert!(library.get("Outline").is_none());
    }
}
