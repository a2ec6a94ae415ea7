//! Network description loader
//!
//! ```text
//! Locations:
//! Nepal, 28.0, 84.0, 2500000, 0.5, 0.3
//! India, 21.0, 78.0, 9000000, 0.48, 0.32
//! Thailand, 15.0, 101.0, 4000000, 0.51, 0.28
//! Routes:
//! Nepal -> India -> Thailand, 120, 90, 60
//! Nepal -> India, 40, 70
//! ```
//!
//! Locations must all appear before `Routes:`. Blank lines and lines starting
//! with `#` are ignored. A route without a transit takes `sourceVol, destVol`;
//! one with a transit takes `sourceVol, transitVol[, destVol]`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::NetworkError;
use crate::location::Coordinates;

const LOCATIONS_MARKER: &str = "Locations:";
const ROUTES_MARKER: &str = "Routes:";

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSpec {
    pub name: String,
    pub coordinates: Coordinates,
    pub population: u64,
    pub gender_ratio: f64,
    pub age_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub source: String,
    pub transit: Option<String>,
    pub destination: String,
    pub source_vol: u32,
    pub transit_vol: u32,
    pub dest_vol: u32,
}

/// A fully resolved network: every route endpoint names a listed location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    pub locations: Vec<LocationSpec>,
    pub routes: Vec<RouteSpec>,
}

impl Network {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }

    pub fn location(&self, name: &str) -> Option<&LocationSpec> {
        self.locations.iter().find(|spec| spec.name == name)
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        match lines.next() {
            Some((_, LOCATIONS_MARKER)) => {}
            _ => return Err(NetworkError::MissingSection(LOCATIONS_MARKER)),
        }

        let mut network = Network::default();
        let mut names = HashSet::new();
        let mut in_routes = false;
        for (line_no, line) in lines {
            if line == ROUTES_MARKER {
                in_routes = true;
                continue;
            }
            if in_routes {
                let route = parse_route(line_no, line)?;
                for name in route_names(&route) {
                    if !names.contains(name) {
                        return Err(NetworkError::UnknownLocation {
                            line: line_no,
                            name: name.to_string(),
                        });
                    }
                }
                network.routes.push(route);
            } else {
                let location = parse_location(line_no, line)?;
                if !names.insert(location.name.clone()) {
                    return Err(NetworkError::DuplicateLocation {
                        line: line_no,
                        name: location.name,
                    });
                }
                network.locations.push(location);
            }
        }

        if !in_routes {
            return Err(NetworkError::MissingSection(ROUTES_MARKER));
        }
        Ok(network)
    }
}

fn route_names(route: &RouteSpec) -> impl Iterator<Item = &str> {
    std::iter::once(route.source.as_str())
        .chain(route.transit.as_deref())
        .chain(std::iter::once(route.destination.as_str()))
}

fn parse_location(line: usize, text: &str) -> Result<LocationSpec, NetworkError> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(malformed(
            line,
            format!("expected 6 location fields, found {}", fields.len()),
        ));
    }
    let name = fields[0];
    if name.is_empty() {
        return Err(malformed(line, "location name is empty"));
    }
    let gender_ratio = parse_ratio(line, "gender ratio", fields[4])?;
    let age_ratio = parse_ratio(line, "age ratio", fields[5])?;
    Ok(LocationSpec {
        name: name.to_string(),
        coordinates: Coordinates {
            latitude: parse_number(line, "latitude", fields[1])?,
            longitude: parse_number(line, "longitude", fields[2])?,
        },
        population: parse_number(line, "population", fields[3])?,
        gender_ratio,
        age_ratio,
    })
}

fn parse_route(line: usize, text: &str) -> Result<RouteSpec, NetworkError> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    let path: Vec<&str> = fields[0].split("->").map(str::trim).collect();
    if path.iter().any(|name| name.is_empty()) {
        return Err(malformed(line, "route has an empty location name"));
    }
    let volumes = fields[1..]
        .iter()
        .map(|field| parse_number::<u32>(line, "volume", field))
        .collect::<Result<Vec<_>, _>>()?;

    let route = match (path.as_slice(), volumes.as_slice()) {
        ([source, destination], [source_vol, dest_vol]) => RouteSpec {
            source: source.to_string(),
            transit: None,
            destination: destination.to_string(),
            source_vol: *source_vol,
            transit_vol: 0,
            dest_vol: *dest_vol,
        },
        ([source, transit, dest], [source_vol, transit_vol, rest @ ..]) if rest.len() <= 1 => {
            RouteSpec {
                source: source.to_string(),
                transit: Some(transit.to_string()),
                destination: dest.to_string(),
                source_vol: *source_vol,
                transit_vol: *transit_vol,
                dest_vol: rest.first().copied().unwrap_or(0),
            }
        }
        ([_, _], _) => {
            return Err(malformed(
                line,
                format!("direct route takes 2 volumes, found {}", volumes.len()),
            ))
        }
        ([_, _, _], _) => {
            return Err(malformed(
                line,
                format!(
                    "route with a transit takes 2 or 3 volumes, found {}",
                    volumes.len()
                ),
            ))
        }
        _ => {
            return Err(malformed(
                line,
                format!("route must list 2 or 3 locations, found {}", path.len()),
            ))
        }
    };

    let names: Vec<&str> = route_names(&route).collect();
    for (index, name) in names.iter().enumerate() {
        if names[..index].contains(name) {
            return Err(NetworkError::RepeatedEndpoint {
                line,
                name: name.to_string(),
            });
        }
    }
    Ok(route)
}

fn parse_number<T: FromStr>(line: usize, what: &str, field: &str) -> Result<T, NetworkError> {
    field
        .parse::<T>()
        .map_err(|_| malformed(line, format!("unable to parse {what} from '{field}'")))
}

fn parse_ratio(line: usize, what: &str, field: &str) -> Result<f64, NetworkError> {
    let value: f64 = parse_number(line, what, field)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(malformed(line, format!("{what} {value} is outside [0, 1]")));
    }
    Ok(value)
}

fn malformed(line: usize, message: impl Into<String>) -> NetworkError {
    NetworkError::Malformed {
        line,
        message: message.into(),
    }
}
