//! gRPC client wrappers.
//!
//! [`AdminClient`] is the convenience handle admin tooling uses against a
//! nameserver; [`GrpcPeer`] adapts the same surface to the
//! [`PeerNameserver`] contract so a leader cluster can drive a remote
//! coordinator over the wire.

use crate::error::NsError;
use crate::peer::PeerNameserver;
use crate::proto;
use crate::proto::name_server_client::NameServerClient;
use crate::server::{
    parse_task_status, parse_task_type, table_from_proto, table_to_proto, task_ref_to_proto,
    zone_to_proto,
};
use crate::tablet::{TaskRef, TaskStatusEntry};
use async_trait::async_trait;
use metaplane::table::{TableInfo, ZoneInfo};
use metaplane::types::{OpId, Pid};
use std::collections::HashMap;
use tonic::Request;
use tonic::transport::{Channel, Endpoint};

/// Client handle against one nameserver endpoint.
#[derive(Debug, Clone)]
pub struct AdminClient {
    endpoint: String,
    client: NameServerClient<Channel>,
}

impl AdminClient {
    /// Connect eagerly to a nameserver.
    pub async fn connect(endpoint: &str) -> Result<Self, NsError> {
        let channel = Endpoint::from_shared(format!("http://{endpoint}"))
            .map_err(|e| NsError::rpc(endpoint, "invalid endpoint", e))?
            .connect()
            .await
            .map_err(|e| NsError::rpc(endpoint, "connect", e))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: NameServerClient::new(channel),
        })
    }

    /// Create a handle that dials on first use.
    pub fn connect_lazy(endpoint: &str) -> Result<Self, NsError> {
        let channel = Endpoint::from_shared(format!("http://{endpoint}"))
            .map_err(|e| NsError::rpc(endpoint, "invalid endpoint", e))?
            .connect_lazy();
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: NameServerClient::new(channel),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn rpc_err(&self, context: &str, e: impl std::fmt::Display) -> NsError {
        NsError::rpc(&self.endpoint, context, e)
    }

    fn check(&self, context: &str, code: u32, msg: &str) -> Result<(), NsError> {
        if code == 0 {
            Ok(())
        } else {
            Err(self.rpc_err(context, format!("code {code}: {msg}")))
        }
    }

    pub async fn create_table(
        &self,
        table: &TableInfo,
        zone: Option<&ZoneInfo>,
    ) -> Result<(), NsError> {
        let request = proto::CreateTableRequest {
            table_info: Some(table_to_proto(table)),
            zone_info: zone.map(zone_to_proto),
            task_info: None,
        };
        let response = self
            .client
            .clone()
            .create_table(Request::new(request))
            .await
            .map_err(|e| self.rpc_err("create table", e))?
            .into_inner();
        self.check("create table", response.code, &response.msg)
    }

    pub async fn drop_table(
        &self,
        db: &str,
        name: &str,
        zone: Option<&ZoneInfo>,
    ) -> Result<(), NsError> {
        let request = proto::DropTableRequest {
            db: db.to_string(),
            name: name.to_string(),
            zone_info: zone.map(zone_to_proto),
            task_info: None,
        };
        let response = self
            .client
            .clone()
            .drop_table(Request::new(request))
            .await
            .map_err(|e| self.rpc_err("drop table", e))?
            .into_inner();
        self.check("drop table", response.code, &response.msg)
    }

    pub async fn show_table(
        &self,
        db: &str,
        name: Option<&str>,
    ) -> Result<Vec<TableInfo>, NsError> {
        let request = proto::ShowTableRequest {
            db: db.to_string(),
            name: name.unwrap_or_default().to_string(),
            show_all: false,
        };
        let response = self
            .client
            .clone()
            .show_table(Request::new(request))
            .await
            .map_err(|e| self.rpc_err("show table", e))?
            .into_inner();
        self.check("show table", response.code, &response.msg)?;
        response.table_info.iter().map(table_from_proto).collect()
    }

    pub async fn show_op_status(&self) -> Result<Vec<proto::OpStatus>, NsError> {
        let request = proto::ShowOpStatusRequest {
            db: String::new(),
            name: String::new(),
            pid: -1,
        };
        let response = self
            .client
            .clone()
            .show_op_status(Request::new(request))
            .await
            .map_err(|e| self.rpc_err("show op status", e))?
            .into_inner();
        self.check("show op status", response.code, &response.msg)?;
        Ok(response.op_status)
    }

    pub async fn cancel_op(&self, op_id: OpId) -> Result<(), NsError> {
        let response = self
            .client
            .clone()
            .cancel_op(Request::new(proto::CancelOpRequest { op_id: op_id.0 }))
            .await
            .map_err(|e| self.rpc_err("cancel op", e))?
            .into_inner();
        self.check("cancel op", response.code, &response.msg)
    }

    pub async fn conf_set(&self, key: &str, value: &str) -> Result<(), NsError> {
        let response = self
            .client
            .clone()
            .conf_set(Request::new(proto::ConfSetRequest {
                key: key.to_string(),
                value: value.to_string(),
            }))
            .await
            .map_err(|e| self.rpc_err("conf set", e))?
            .into_inner();
        self.check("conf set", response.code, &response.msg)
    }
}

/// Peer coordinator over gRPC.
pub struct GrpcPeer {
    inner: AdminClient,
}

impl GrpcPeer {
    pub fn new(inner: AdminClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PeerNameserver for GrpcPeer {
    async fn show_all_table(&self) -> Result<Vec<TableInfo>, NsError> {
        let request = proto::ShowTableRequest {
            db: String::new(),
            name: String::new(),
            show_all: true,
        };
        let response = self
            .inner
            .client
            .clone()
            .show_table(Request::new(request))
            .await
            .map_err(|e| self.inner.rpc_err("show all table", e))?
            .into_inner();
        self.inner
            .check("show all table", response.code, &response.msg)?;
        response.table_info.iter().map(table_from_proto).collect()
    }

    async fn create_table_remote(
        &self,
        table: &TableInfo,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError> {
        let request = proto::CreateTableRequest {
            table_info: Some(table_to_proto(table)),
            zone_info: Some(zone_to_proto(zone)),
            task_info: Some(task_ref_to_proto(task)),
        };
        let response = self
            .inner
            .client
            .clone()
            .create_table(Request::new(request))
            .await
            .map_err(|e| self.inner.rpc_err("create table remote", e))?
            .into_inner();
        self.inner
            .check("create table remote", response.code, &response.msg)
    }

    async fn drop_table_remote(
        &self,
        db: &str,
        name: &str,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError> {
        let request = proto::DropTableRequest {
            db: db.to_string(),
            name: name.to_string(),
            zone_info: Some(zone_to_proto(zone)),
            task_info: Some(task_ref_to_proto(task)),
        };
        let response = self
            .inner
            .client
            .clone()
            .drop_table(Request::new(request))
            .await
            .map_err(|e| self.inner.rpc_err("drop table remote", e))?
            .into_inner();
        self.inner
            .check("drop table remote", response.code, &response.msg)
    }

    async fn add_replica_ns_remote(
        &self,
        db: &str,
        name: &str,
        pid: Pid,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError> {
        let request = proto::AddReplicaNsRemoteRequest {
            db: db.to_string(),
            name: name.to_string(),
            pid: pid.0,
            zone_info: Some(zone_to_proto(zone)),
            task_info: Some(task_ref_to_proto(task)),
        };
        let response = self
            .inner
            .client
            .clone()
            .add_replica_ns_remote(Request::new(request))
            .await
            .map_err(|e| self.inner.rpc_err("add replica ns remote", e))?
            .into_inner();
        self.inner
            .check("add replica ns remote", response.code, &response.msg)
    }

    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>, NsError> {
        let response = self
            .inner
            .client
            .clone()
            .get_task_status(Request::new(proto::GetTaskStatusRequest {}))
            .await
            .map_err(|e| self.inner.rpc_err("get task status", e))?
            .into_inner();
        self.inner
            .check("get task status", response.code, &response.msg)?;
        response
            .tasks
            .iter()
            .map(|t| {
                Ok(TaskStatusEntry {
                    op_id: OpId(t.op_id),
                    task_type: parse_task_type(&t.task_type)?,
                    status: parse_task_status(&t.status)?,
                    endpoint: t.endpoint.clone(),
                })
            })
            .collect()
    }

    async fn delete_op(&self, op_id: OpId) -> Result<(), NsError> {
        let response = self
            .inner
            .client
            .clone()
            .delete_op(Request::new(proto::DeleteOpRequest { op_id: op_id.0 }))
            .await
            .map_err(|e| self.inner.rpc_err("delete op", e))?
            .into_inner();
        self.inner.check("delete op", response.code, &response.msg)
    }

    async fn make_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        let response = self
            .inner
            .client
            .clone()
            .make_replica_cluster(Request::new(proto::MakeReplicaClusterRequest {
                zone_info: Some(zone_to_proto(zone)),
            }))
            .await
            .map_err(|e| self.inner.rpc_err("make replica cluster", e))?
            .into_inner();
        self.inner
            .check("make replica cluster", response.code, &response.msg)
    }

    async fn remove_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        let response = self
            .inner
            .client
            .clone()
            .remove_replica_cluster_by_ns(Request::new(proto::MakeReplicaClusterRequest {
                zone_info: Some(zone_to_proto(zone)),
            }))
            .await
            .map_err(|e| self.inner.rpc_err("remove replica cluster", e))?
            .into_inner();
        self.inner
            .check("remove replica cluster", response.code, &response.msg)
    }

    async fn show_real_endpoint_map(&self) -> Result<HashMap<String, String>, NsError> {
        let response = self
            .inner
            .client
            .clone()
            .show_real_ep_map(Request::new(proto::ShowRealEpMapRequest {}))
            .await
            .map_err(|e| self.inner.rpc_err("show real ep map", e))?
            .into_inner();
        self.inner
            .check("show real ep map", response.code, &response.msg)?;
        Ok(response.map)
    }
}
