//! 执行图构建器
//!
//! 提供流畅的API来构建执行图，build() 时统一校验：
//! 入口已设置且已注册、节点不重复、每个节点恰有一条出边、所有目标均已注册、挂起点已注册。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::AgentState;
use crate::workflow::graph::StateGraph;
use crate::workflow::node::Node;
use crate::workflow::types::*;

/// 执行图构建器
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    entry: Option<NodeId>,
    interrupts: HashMap<NodeId, SignalKind>,
    errors: Vec<WorkflowError>,
}

impl GraphBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点（以节点自身的 id 为键）
    pub fn node(mut self, node: impl Node + 'static) -> Self {
        self.insert_node(Arc::new(node));
        self
    }

    fn insert_node(&mut self, node: Arc<dyn Node>) {
        let id = node.id();
        if self.nodes.insert(id, node).is_some() {
            self.errors.push(WorkflowError::DuplicateNode(id));
        }
    }

    /// 设置入口节点
    pub fn entry(mut self, id: NodeId) -> Self {
        self.entry = Some(id);
        self
    }

    /// 直接边
    pub fn edge(mut self, from: NodeId, to: impl Into<Target>) -> Self {
        self.insert_edge(from, Edge::Direct(to.into()));
        self
    }

    /// 条件边：route 的返回值必须在 targets 之内
    pub fn conditional_edge<F>(mut self, from: NodeId, targets: Vec<Target>, route: F) -> Self
    where
        F: Fn(&AgentState) -> Target + Send + Sync + 'static,
    {
        if targets.is_empty() {
            self.errors.push(WorkflowError::EmptyTargets(from));
        }
        self.insert_edge(
            from,
            Edge::Conditional {
                route: Arc::new(route),
                targets,
            },
        );
        self
    }

    fn insert_edge(&mut self, from: NodeId, edge: Edge) {
        if self.edges.insert(from, edge).is_some() {
            self.errors.push(WorkflowError::DuplicateEdge(from));
        }
    }

    /// 声明挂起点：进入 id 之前暂停，等待 signal 类型的恢复信号
    pub fn interrupt_before(mut self, id: NodeId, signal: SignalKind) -> Self {
        self.interrupts.insert(id, signal);
        self
    }

    /// 校验并构建执行图
    pub fn build(self) -> Result<StateGraph, WorkflowError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let entry = self.entry.ok_or(WorkflowError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(WorkflowError::UnknownNode(entry));
        }

        let mut sources: Vec<&NodeId> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.nodes.contains_key(from) {
                return Err(WorkflowError::UnknownNode(*from));
            }
            for target in self.edges[from].targets() {
                if let Target::Node(to) = target {
                    if !self.nodes.contains_key(&to) {
                        return Err(WorkflowError::UnknownNode(to));
                    }
                }
            }
        }

        let mut ids: Vec<&NodeId> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            if !self.edges.contains_key(id) {
                return Err(WorkflowError::MissingEdge(*id));
            }
        }

        for id in self.interrupts.keys() {
            if !self.nodes.contains_key(id) {
                return Err(WorkflowError::UnknownNode(*id));
            }
        }

        Ok(StateGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            interrupts: self.interrupts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentError, StateUpdate};
    use async_trait::async_trait;

    struct Noop(NodeId);

    #[async_trait]
    impl Node for Noop {
        fn id(&self) -> NodeId {
            self.0
        }
        async fn run(&self, _state: &AgentState) -> Result<StateUpdate, AgentError> {
            Ok(StateUpdate::new())
        }
    }

    #[test]
    fn test_build_simple_graph() {
        let graph = GraphBuilder::new()
            .node(Noop(NodeId::Router))
            .node(Noop(NodeId::Chat))
            .entry(NodeId::Router)
            .edge(NodeId::Router, NodeId::Chat)
            .edge(NodeId::Chat, Target::End)
            .build()
            .expect("graph should build");

        assert_eq!(graph.entry(), NodeId::Router);
        assert_eq!(graph.node_ids(), vec![NodeId::Router, NodeId::Chat]);
        let state = AgentState::new();
        assert_eq!(
            graph.next(NodeId::Router, &state).unwrap(),
            Target::Node(NodeId::Chat)
        );
        assert_eq!(graph.next(NodeId::Chat, &state).unwrap(), Target::End);
    }

    #[test]
    fn test_build_without_entry_fails() {
        let result = GraphBuilder::new()
            .node(Noop(NodeId::Chat))
            .edge(NodeId::Chat, Target::End)
            .build();
        assert!(matches!(result, Err(WorkflowError::MissingEntry)));
    }

    #[test]
    fn test_undeclared_node_target_fails() {
        let result = GraphBuilder::new()
            .node(Noop(NodeId::Router))
            .entry(NodeId::Router)
            .edge(NodeId::Router, NodeId::Planner)
            .build();
        assert!(matches!(
            result,
            Err(WorkflowError::UnknownNode(NodeId::Planner))
        ));
    }

    #[test]
    fn test_missing_edge_fails() {
        let result = GraphBuilder::new()
            .node(Noop(NodeId::Router))
            .node(Noop(NodeId::Chat))
            .entry(NodeId::Router)
            .edge(NodeId::Router, NodeId::Chat)
            .build();
        assert!(matches!(result, Err(WorkflowError::MissingEdge(NodeId::Chat))));
    }

    #[test]
    fn test_duplicate_node_fails() {
        let result = GraphBuilder::new()
            .node(Noop(NodeId::Chat))
            .node(Noop(NodeId::Chat))
            .entry(NodeId::Chat)
            .edge(NodeId::Chat, Target::End)
            .build();
        assert!(matches!(result, Err(WorkflowError::DuplicateNode(NodeId::Chat))));
    }

    #[test]
    fn test_route_to_undeclared_target_is_rejected() {
        let graph = GraphBuilder::new()
            .node(Noop(NodeId::Router))
            .node(Noop(NodeId::Chat))
            .node(Noop(NodeId::Explainer))
            .entry(NodeId::Router)
            .conditional_edge(NodeId::Router, vec![NodeId::Chat.into()], |_| {
                Target::Node(NodeId::Explainer)
            })
            .edge(NodeId::Chat, Target::End)
            .edge(NodeId::Explainer, Target::End)
            .build()
            .unwrap();
        let err = graph.next(NodeId::Router, &AgentState::new()).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::UndeclaredTarget {
                from: NodeId::Router,
                target: Target::Node(NodeId::Explainer)
            }
        );
    }
}
