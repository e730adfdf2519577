use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};

/// Whether a declared service is a two-way API call or a one-way
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Api,
    Msg,
}

/// Static metadata for one declared service.
///
/// API services carry a request and a response schema id; message
/// services carry a single message schema id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceDescriptor {
    #[serde(rename_all = "camelCase")]
    Api {
        id: u32,
        name: String,
        req_schema_id: String,
        res_schema_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Msg {
        id: u32,
        name: String,
        msg_schema_id: String,
    },
}

impl ServiceDescriptor {
    pub fn id(&self) -> u32 {
        match self {
            Self::Api { id, .. } | Self::Msg { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Api { name, .. } | Self::Msg { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        match self {
            Self::Api { .. } => ServiceKind::Api,
            Self::Msg { .. } => ServiceKind::Msg,
        }
    }

    /// Request schema id; `None` for message services.
    pub fn req_schema_id(&self) -> Option<&str> {
        match self {
            Self::Api { req_schema_id, .. } => Some(req_schema_id),
            Self::Msg { .. } => None,
        }
    }

    /// Response schema id; `None` for message services.
    pub fn res_schema_id(&self) -> Option<&str> {
        match self {
            Self::Api { res_schema_id, .. } => Some(res_schema_id),
            Self::Msg { .. } => None,
        }
    }

    /// Message schema id; `None` for API services.
    pub fn msg_schema_id(&self) -> Option<&str> {
        match self {
            Self::Api { .. } => None,
            Self::Msg { msg_schema_id, .. } => Some(msg_schema_id),
        }
    }
}

/// Declared top-level fields of a named schema.
///
/// Consumed by the JSON wire mode to prune undeclared fields before
/// encoding and after decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaShape {
    pub fields: Vec<String>,
}

impl SchemaShape {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// The protocol description shared by client and server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceProto {
    pub services: Vec<ServiceDescriptor>,
    /// Schema shapes by schema id, for JSON-mode pruning. Optional;
    /// binary deployments usually leave it empty.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub types: HashMap<String, SchemaShape>,
}

/// Immutable lookup from service name and numeric id to descriptor.
///
/// API names and message names are separate namespaces. Built once at
/// client construction; safe to share across concurrent calls without
/// synchronization.
#[derive(Debug, Clone, Default)]
pub struct ServiceMap {
    by_id: HashMap<u32, Arc<ServiceDescriptor>>,
    api_by_name: HashMap<String, Arc<ServiceDescriptor>>,
    msg_by_name: HashMap<String, Arc<ServiceDescriptor>>,
}

impl ServiceMap {
    /// Build the lookup tables, rejecting duplicate ids and names.
    pub fn new(proto: &ServiceProto) -> Result<Self> {
        let mut map = Self::default();
        for service in &proto.services {
            let service = Arc::new(service.clone());
            if map.by_id.insert(service.id(), Arc::clone(&service)).is_some() {
                return Err(ProtoError::DuplicateId(service.id()));
            }
            let by_name = match service.kind() {
                ServiceKind::Api => &mut map.api_by_name,
                ServiceKind::Msg => &mut map.msg_by_name,
            };
            if by_name
                .insert(service.name().to_string(), Arc::clone(&service))
                .is_some()
            {
                return Err(match service.kind() {
                    ServiceKind::Api => ProtoError::DuplicateApiName(service.name().to_string()),
                    ServiceKind::Msg => ProtoError::DuplicateMsgName(service.name().to_string()),
                });
            }
        }
        Ok(map)
    }

    pub fn api_by_name(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.api_by_name.get(name)
    }

    pub fn msg_by_name(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.msg_by_name.get(name)
    }

    pub fn by_id(&self, id: u32) -> Option<&Arc<ServiceDescriptor>> {
        self.by_id.get(&id)
    }

    /// Total number of declared services.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(id: u32, name: &str) -> ServiceDescriptor {
        ServiceDescriptor::Api {
            id,
            name: name.to_string(),
            req_schema_id: format!("Ptl{name}/Req{name}"),
            res_schema_id: format!("Ptl{name}/Res{name}"),
        }
    }

    fn msg(id: u32, name: &str) -> ServiceDescriptor {
        ServiceDescriptor::Msg {
            id,
            name: name.to_string(),
            msg_schema_id: format!("Msg{name}/Msg{name}"),
        }
    }

    #[test]
    fn lookup_roundtrips_every_declared_service() {
        let proto = ServiceProto {
            services: vec![api(0, "Test"), api(1, "HelloWorld"), msg(2, "Chat")],
            ..ServiceProto::default()
        };
        let map = ServiceMap::new(&proto).unwrap();

        assert_eq!(map.len(), 3);
        for service in &proto.services {
            let by_id = map.by_id(service.id()).unwrap();
            assert_eq!(by_id.as_ref(), service);
            let by_name = match service.kind() {
                ServiceKind::Api => map.api_by_name(service.name()).unwrap(),
                ServiceKind::Msg => map.msg_by_name(service.name()).unwrap(),
            };
            assert_eq!(by_name.as_ref(), service);
        }
    }

    #[test]
    fn api_and_msg_names_are_separate_namespaces() {
        let proto = ServiceProto {
            services: vec![api(0, "Chat"), msg(1, "Chat")],
            ..ServiceProto::default()
        };
        let map = ServiceMap::new(&proto).unwrap();

        assert_eq!(map.api_by_name("Chat").unwrap().id(), 0);
        assert_eq!(map.msg_by_name("Chat").unwrap().id(), 1);
        assert!(map.api_by_name("Missing").is_none());
    }

    #[test]
    fn duplicate_id_is_fatal() {
        let proto = ServiceProto {
            services: vec![api(7, "A"), msg(7, "B")],
            ..ServiceProto::default()
        };
        assert!(matches!(
            ServiceMap::new(&proto),
            Err(ProtoError::DuplicateId(7))
        ));
    }

    #[test]
    fn duplicate_names_are_fatal_per_namespace() {
        let proto = ServiceProto {
            services: vec![api(0, "A"), api(1, "A")],
            ..ServiceProto::default()
        };
        assert!(matches!(
            ServiceMap::new(&proto),
            Err(ProtoError::DuplicateApiName(name)) if name == "A"
        ));

        let proto = ServiceProto {
            services: vec![msg(0, "M"), msg(1, "M")],
            ..ServiceProto::default()
        };
        assert!(matches!(
            ServiceMap::new(&proto),
            Err(ProtoError::DuplicateMsgName(name)) if name == "M"
        ));
    }

    #[test]
    fn proto_deserializes_from_json() {
        let json = r#"{
            "services": [
                { "type": "api", "id": 0, "name": "Test",
                  "reqSchemaId": "PtlTest/ReqTest", "resSchemaId": "PtlTest/ResTest" },
                { "type": "msg", "id": 1, "name": "Chat",
                  "msgSchemaId": "MsgChat/MsgChat" }
            ],
            "types": {
                "PtlTest/ReqTest": { "fields": ["name"] }
            }
        }"#;
        let proto: ServiceProto = serde_json::from_str(json).unwrap();
        assert_eq!(proto.services.len(), 2);
        assert_eq!(proto.services[0].kind(), ServiceKind::Api);
        assert_eq!(proto.services[0].req_schema_id(), Some("PtlTest/ReqTest"));
        assert_eq!(proto.services[1].msg_schema_id(), Some("MsgChat/MsgChat"));
        assert_eq!(
            proto.types["PtlTest/ReqTest"],
            SchemaShape::new(["name"])
        );
    }

    #[test]
    fn descriptor_accessors_by_kind() {
        let a = api(0, "Test");
        assert_eq!(a.kind(), ServiceKind::Api);
        assert_eq!(a.req_schema_id(), Some("PtlTest/ReqTest"));
        assert_eq!(a.msg_schema_id(), None);

        let m = msg(1, "Chat");
        assert_eq!(m.kind(), ServiceKind::Msg);
        assert_eq!(m.req_schema_id(), None);
        assert_eq!(m.msg_schema_id(), Some("MsgChat/MsgChat"));
    }
}
