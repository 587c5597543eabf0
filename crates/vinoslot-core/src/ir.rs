//! Reader for the topology half of an OpenVINO IR model.
//!
//! Only what the session needs is extracted: the layer list (sub-graph
//! bodies included), the network inputs (top-level `Parameter` layers) and
//! outputs (producers feeding top-level `Result` layers), each with element
//! type and declared dimensions. Weights are never opened here.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{DType, IOName, LayerSpec, ModelArtifact, Network, TensorSpec, TopologyError};

/// Precision assumed for output ports that do not declare one.
const DEFAULT_PRECISION: DType = DType::F32;

// Element paths, innermost last, that hold the parts read from the top graph.
const OUTPUT_PORTS: &[&[u8]] = &[b"layer", b"output"];
const LAYER_DATA: &[&[u8]] = &[b"layer"];
const EDGES: &[&[u8]] = &[b"edges"];

pub fn read_network(artifact: &ModelArtifact) -> Result<Network, TopologyError> {
    let xml = std::fs::read_to_string(&artifact.topology).map_err(|source| TopologyError::Io {
        path: artifact.topology.clone(),
        source,
    })?;
    parse_network(&xml, artifact.clone())
}

#[derive(Default)]
struct PortInfo {
    precision: Option<String>,
    dims: Vec<Option<usize>>,
}

struct OpenPort {
    layer: String,
    id: String,
    info: PortInfo,
}

#[derive(Default)]
struct ParamData {
    shape: Option<String>,
    element_type: Option<String>,
}

pub fn parse_network(xml: &str, artifact: ModelArtifact) -> Result<Network, TopologyError> {
    let mut reader = Reader::from_str(xml);

    let mut name = String::new();
    let mut layers: Vec<LayerSpec> = Vec::new();
    let mut params: HashMap<String, ParamData> = HashMap::new();
    let mut ports: HashMap<(String, String), PortInfo> = HashMap::new();
    // to-layer id -> (from-layer id, from-port id)
    let mut producers: HashMap<String, (String, String)> = HashMap::new();

    // Open element names, outermost first. Layer ids restart inside each
    // `<body>`, so ports, data and edges are only taken from the top graph.
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut layer_stack: Vec<String> = Vec::new();
    let mut open_port: Option<OpenPort> = None;
    let mut in_dim = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let top = nesting(&open) == 0;
                match e.name().as_ref() {
                    b"net" if open.is_empty() => name = attr(&e, "name")?.unwrap_or_default(),
                    b"layer" => {
                        let layer = layer_spec(&e, nesting(&open))?;
                        layer_stack.push(layer.id.clone());
                        layers.push(layer);
                    }
                    b"port" if top && within(&open, OUTPUT_PORTS) => {
                        if let Some(layer) = layer_stack.last() {
                            open_port = Some(OpenPort {
                                layer: layer.clone(),
                                id: required(&e, "port", "id")?,
                                info: PortInfo {
                                    precision: attr(&e, "precision")?,
                                    dims: Vec::new(),
                                },
                            });
                        }
                    }
                    b"dim" if open_port.is_some() => in_dim = true,
                    b"data" if top && within(&open, LAYER_DATA) => {
                        record_data(&e, layer_stack.last().map(String::as_str), &mut params)?
                    }
                    _ => {}
                }
                open.push(e.name().as_ref().to_vec());
            }
            Event::Empty(e) => {
                let top = nesting(&open) == 0;
                match e.name().as_ref() {
                    b"layer" => layers.push(layer_spec(&e, nesting(&open))?),
                    b"data" if top && within(&open, LAYER_DATA) => {
                        record_data(&e, layer_stack.last().map(String::as_str), &mut params)?
                    }
                    b"port" if top && within(&open, OUTPUT_PORTS) => {
                        if let Some(layer) = layer_stack.last() {
                            let id = required(&e, "port", "id")?;
                            let info = PortInfo {
                                precision: attr(&e, "precision")?,
                                dims: Vec::new(),
                            };
                            ports.insert((layer.clone(), id), info);
                        }
                    }
                    b"edge" if top && within(&open, EDGES) => {
                        let from_layer = required(&e, "edge", "from-layer")?;
                        let from_port = required(&e, "edge", "from-port")?;
                        let to_layer = required(&e, "edge", "to-layer")?;
                        producers
                            .entry(to_layer)
                            .or_insert((from_layer, from_port));
                    }
                    _ => {}
                }
            }
            Event::Text(t) if in_dim => {
                let raw = t.unescape().map_err(quick_xml::Error::from)?;
                if let Some(port) = open_port.as_mut() {
                    let dim = parse_dim(raw.trim()).ok_or_else(|| TopologyError::InvalidShape {
                        layer: port.layer.clone(),
                        raw: raw.trim().to_string(),
                    })?;
                    port.info.dims.push(dim);
                }
            }
            Event::End(e) => {
                open.pop();
                match e.name().as_ref() {
                    b"dim" => in_dim = false,
                    b"port" => {
                        if let Some(port) = open_port.take() {
                            ports.insert((port.layer, port.id), port.info);
                        }
                    }
                    b"layer" => {
                        layer_stack.pop();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let top_level = || layers.iter().filter(|l| l.depth == 0);
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for layer in top_level() {
        match layer.kind.as_str() {
            "Parameter" => inputs.push(parameter_spec(layer, params.get(&layer.id), &ports)?),
            "Result" => {
                let (from_layer, from_port) =
                    producers
                        .get(&layer.id)
                        .ok_or_else(|| TopologyError::DanglingResult {
                            layer: layer.name.clone(),
                        })?;
                let producer = top_level().find(|l| &l.id == from_layer).ok_or_else(|| {
                    TopologyError::DanglingResult {
                        layer: layer.name.clone(),
                    }
                })?;
                let port = ports.get(&(from_layer.clone(), from_port.clone()));
                outputs.push(port_spec(&producer.name, port)?);
            }
            _ => {}
        }
    }

    Ok(Network {
        name,
        artifact,
        layers,
        inputs,
        outputs,
    })
}

/// Number of sub-graph bodies enclosing the current element.
fn nesting(open: &[Vec<u8>]) -> usize {
    open.iter().filter(|n| n.as_slice() == b"body").count()
}

/// Whether the innermost open elements are exactly `tail`.
fn within(open: &[Vec<u8>], tail: &[&[u8]]) -> bool {
    open.len() >= tail.len()
        && open[open.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a.as_slice() == *b)
}

fn layer_spec(e: &BytesStart<'_>, depth: usize) -> Result<LayerSpec, TopologyError> {
    Ok(LayerSpec {
        id: required(e, "layer", "id")?,
        name: required(e, "layer", "name")?,
        kind: required(e, "layer", "type")?,
        version: attr(e, "version")?,
        depth,
    })
}

fn record_data(
    e: &BytesStart<'_>,
    layer: Option<&str>,
    params: &mut HashMap<String, ParamData>,
) -> Result<(), TopologyError> {
    let Some(layer) = layer else {
        return Ok(());
    };
    let shape = attr(e, "shape")?;
    let element_type = attr(e, "element_type")?;
    if shape.is_some() || element_type.is_some() {
        params.insert(
            layer.to_string(),
            ParamData {
                shape,
                element_type,
            },
        );
    }
    Ok(())
}

fn parameter_spec(
    layer: &LayerSpec,
    data: Option<&ParamData>,
    ports: &HashMap<(String, String), PortInfo>,
) -> Result<TensorSpec, TopologyError> {
    // Older IR versions carry no <data>; the output port describes the tensor.
    let port = ports
        .iter()
        .find(|((l, _), _)| l == &layer.id)
        .map(|(_, info)| info);

    let dims = match data.and_then(|d| d.shape.as_deref()) {
        Some(raw) => parse_shape(raw).ok_or_else(|| TopologyError::InvalidShape {
            layer: layer.name.clone(),
            raw: raw.to_string(),
        })?,
        None => port.map(|p| p.dims.clone()).unwrap_or_default(),
    };

    let raw_type = data
        .and_then(|d| d.element_type.as_deref())
        .or_else(|| port.and_then(|p| p.precision.as_deref()));
    let dtype = match raw_type {
        Some(raw) => DType::from_ir(raw).ok_or_else(|| TopologyError::UnknownElementType {
            layer: layer.name.clone(),
            raw: raw.to_string(),
        })?,
        None => DEFAULT_PRECISION,
    };

    Ok(TensorSpec {
        name: IOName(layer.name.clone()),
        dtype,
        rank: dims.len(),
        dims,
    })
}

fn port_spec(name: &str, port: Option<&PortInfo>) -> Result<TensorSpec, TopologyError> {
    let dims = port.map(|p| p.dims.clone()).unwrap_or_default();
    let dtype = match port.and_then(|p| p.precision.as_deref()) {
        Some(raw) => DType::from_ir(raw).ok_or_else(|| TopologyError::UnknownElementType {
            layer: name.to_string(),
            raw: raw.to_string(),
        })?,
        None => DEFAULT_PRECISION,
    };
    Ok(TensorSpec {
        name: IOName(name.to_string()),
        dtype,
        rank: dims.len(),
        dims,
    })
}

fn parse_shape(raw: &str) -> Option<Vec<Option<usize>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(Vec::new());
    }
    raw.split(',').map(|d| parse_dim(d.trim())).collect()
}

/// `None` inside `Some` marks a dynamic dimension (`?`, `-1`, or a range
/// such as `1..8`).
fn parse_dim(raw: &str) -> Option<Option<usize>> {
    if raw == "?" || raw == "-1" || raw.contains("..") {
        return Some(None);
    }
    raw.parse::<usize>().ok().map(Some)
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, TopologyError> {
    for a in e.attributes() {
        let a = a?;
        if a.key.as_ref() == key.as_bytes() {
            let value = a.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, TopologyError> {
    attr(e, attribute)?.ok_or(TopologyError::MissingAttribute { element, attribute })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIFIER: &str = r#"<?xml version="1.0"?>
<net name="tiny_classifier" version="11">
  <layers>
    <layer id="0" name="image" type="Parameter" version="opset1">
      <data shape="1,3,4,4" element_type="f32"/>
      <output>
        <port id="0" precision="FP32" names="image">
          <dim>1</dim><dim>3</dim><dim>4</dim><dim>4</dim>
        </port>
      </output>
    </layer>
    <layer id="1" name="act" type="Relu" version="opset1">
      <input>
        <port id="0" precision="FP32"><dim>1</dim><dim>3</dim><dim>4</dim><dim>4</dim></port>
      </input>
      <output>
        <port id="1" precision="FP32"><dim>1</dim><dim>3</dim><dim>4</dim><dim>4</dim></port>
      </output>
    </layer>
    <layer id="2" name="act/sink_port_0" type="Result" version="opset1">
      <input>
        <port id="0" precision="FP32"><dim>1</dim><dim>3</dim><dim>4</dim><dim>4</dim></port>
      </input>
    </layer>
  </layers>
  <edges>
    <edge from-layer="0" from-port="0" to-layer="1" to-port="0"/>
    <edge from-layer="1" from-port="1" to-layer="2" to-port="0"/>
  </edges>
</net>"#;

    fn parse(xml: &str) -> Result<Network, TopologyError> {
        parse_network(xml, ModelArtifact::from_topology("tiny.xml"))
    }

    #[test]
    fn reads_ports_and_layers() {
        let net = parse(CLASSIFIER).unwrap();
        assert_eq!(net.name, "tiny_classifier");
        assert_eq!(net.layers.len(), 3);
        assert_eq!(net.layers[1].kind, "Relu");
        assert_eq!(net.layers[1].version.as_deref(), Some("opset1"));

        assert_eq!(net.inputs.len(), 1);
        assert_eq!(net.inputs[0].name.as_str(), "image");
        assert_eq!(net.inputs[0].dims, vec![Some(1), Some(3), Some(4), Some(4)]);
        assert_eq!(net.inputs[0].dtype, DType::F32);

        assert_eq!(net.outputs.len(), 1);
        assert_eq!(net.outputs[0].name.as_str(), "act");
        assert_eq!(net.outputs[0].rank, 4);
    }

    #[test]
    fn dynamic_and_scalar_shapes() {
        assert_eq!(parse_shape("?,3,-1"), Some(vec![None, Some(3), None]));
        assert_eq!(parse_shape("1..8,16"), Some(vec![None, Some(16)]));
        assert_eq!(parse_shape(""), Some(vec![]));
        assert_eq!(parse_shape("1,x"), None);
    }

    #[test]
    fn invalid_shape_is_reported() {
        let xml = CLASSIFIER.replace("shape=\"1,3,4,4\"", "shape=\"1,three\"");
        let err = parse(&xml).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidShape { ref layer, .. } if layer == "image"));
    }

    #[test]
    fn unknown_element_type_is_reported() {
        let xml = CLASSIFIER.replace("element_type=\"f32\"", "element_type=\"nf4\"");
        let err = parse(&xml).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownElementType { .. }));
    }

    #[test]
    fn result_without_edge_is_dangling() {
        let xml = CLASSIFIER.replace(
            r#"<edge from-layer="1" from-port="1" to-layer="2" to-port="0"/>"#,
            "",
        );
        let err = parse(&xml).unwrap_err();
        assert!(matches!(err, TopologyError::DanglingResult { .. }));
    }

    #[test]
    fn missing_layer_type_is_reported() {
        let xml = CLASSIFIER.replace(r#"type="Relu" "#, "");
        let err = parse(&xml).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::MissingAttribute {
                element: "layer",
                attribute: "type"
            }
        ));
    }

    const LOOPED: &str = r#"<?xml version="1.0"?>
<net name="looped" version="11">
  <layers>
    <layer id="0" name="x" type="Parameter" version="opset1">
      <data shape="1,4" element_type="f32"/>
      <output><port id="0" precision="FP32"><dim>1</dim><dim>4</dim></port></output>
    </layer>
    <layer id="1" name="iter" type="TensorIterator" version="opset1">
      <input><port id="0"><dim>1</dim><dim>4</dim></port></input>
      <output><port id="1" precision="FP32"><dim>1</dim><dim>4</dim></port></output>
      <port_map>
        <input external_port_id="0" internal_layer_id="0"/>
        <output external_port_id="1" internal_layer_id="2"/>
      </port_map>
      <body>
        <layers>
          <layer id="0" name="body_in" type="Parameter" version="opset1">
            <data shape="1,2" element_type="i32"/>
            <output><port id="0" precision="I32"><dim>1</dim><dim>2</dim></port></output>
          </layer>
          <layer id="1" name="step" type="Sigmoid" version="opset1"/>
          <layer id="2" name="body_out" type="Result" version="opset1"/>
        </layers>
        <edges>
          <edge from-layer="0" from-port="0" to-layer="1" to-port="0"/>
          <edge from-layer="1" from-port="1" to-layer="2" to-port="0"/>
        </edges>
      </body>
    </layer>
    <layer id="2" name="out" type="Result" version="opset1">
      <input><port id="0"><dim>1</dim><dim>4</dim></port></input>
    </layer>
  </layers>
  <edges>
    <edge from-layer="0" from-port="0" to-layer="1" to-port="0"/>
    <edge from-layer="1" from-port="1" to-layer="2" to-port="0"/>
  </edges>
</net>"#;

    #[test]
    fn body_layers_stay_out_of_the_ports() {
        let net = parse(LOOPED).unwrap();
        let names = |specs: &[TensorSpec]| -> Vec<String> {
            specs.iter().map(|s| s.name.to_string()).collect()
        };
        assert_eq!(names(&net.inputs), ["x"]);
        assert_eq!(names(&net.outputs), ["iter"]);
        assert_eq!(net.inputs[0].dims, vec![Some(1), Some(4)]);
        assert_eq!(net.inputs[0].dtype, DType::F32);

        // Body operators still count towards the support check.
        assert!(net.operator_kinds().contains("Sigmoid"));
        let step = net.layers.iter().find(|l| l.name == "step").unwrap();
        assert_eq!(step.depth, 1);
        assert_eq!(net.layers.iter().filter(|l| l.depth == 0).count(), 3);
    }

    #[test]
    fn self_closing_layers_are_listed() {
        let xml = CLASSIFIER.replace(
            r#"<layer id="2" name="act/sink_port_0" type="Result" version="opset1">
      <input>
        <port id="0" precision="FP32"><dim>1</dim><dim>3</dim><dim>4</dim><dim>4</dim></port>
      </input>
    </layer>"#,
            r#"<layer id="2" name="act/sink_port_0" type="Result" version="opset1"/>
    <layer id="3" name="gate" type="Swish" version="opset4"/>"#,
        );
        let net = parse(&xml).unwrap();
        assert_eq!(net.layers.len(), 4);
        assert!(net.operator_kinds().contains("Swish"));
        assert_eq!(net.outputs[0].name.as_str(), "act");
    }

    #[test]
    fn missing_file_is_io_error() {
        let artifact = ModelArtifact::from_topology("/nonexistent/vinoslot/net.xml");
        assert!(matches!(
            read_network(&artifact),
            Err(TopologyError::Io { .. })
        ));
    }
}
