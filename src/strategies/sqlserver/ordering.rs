//! Table creation order over the foreign-key graph
//!
//! Referenced tables come before referencing ones. Tables that reference each
//! other (directly or through a longer loop) form a cycle cluster: they are
//! created together, in name order, and all foreign keys are added afterwards
//! in their own stage so no constraint is lost.

use super::catalog::{ForeignKeyDef, TableRef};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOrder {
    /// Every table exactly once, dependencies first
    pub tables: Vec<TableRef>,
    /// Groups of tables whose foreign keys form a cycle
    pub cycles: Vec<Vec<TableRef>>,
}

/// Order `tables` so that every FK target precedes the table holding the FK
///
/// Self references and references to tables outside the set are ignored.
pub fn dependency_order(tables: &[TableRef], foreign_keys: &[ForeignKeyDef]) -> TableOrder {
    let nodes: Vec<TableRef> = tables
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: BTreeMap<&TableRef, usize> = nodes.iter().enumerate().map(|(i, t)| (t, i)).collect();

    // Edge referenced -> referencing
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
    for fk in foreign_keys {
        if fk.table == fk.referenced {
            continue;
        }
        if let (Some(&from), Some(&to)) = (index.get(&fk.referenced), index.get(&fk.table)) {
            edges[from].insert(to);
        }
    }

    let components = strongly_connected(&edges);

    let mut component_of = vec![0; nodes.len()];
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            component_of[m] = c;
        }
    }

    let mut indegree = vec![0usize; components.len()];
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    for (from, targets) in edges.iter().enumerate() {
        for &to in targets {
            let (a, b) = (component_of[from], component_of[to]);
            if a != b && successors[a].insert(b) {
                indegree[b] += 1;
            }
        }
    }

    // Kahn over the condensed graph; ties broken by the smallest member name
    let key = |c: usize| components[c].iter().copied().min().unwrap_or(usize::MAX);
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..components.len())
        .filter(|&c| indegree[c] == 0)
        .map(|c| Reverse((key(c), c)))
        .collect();

    let mut order = TableOrder::default();
    while let Some(Reverse((_, c))) = ready.pop() {
        let mut members = components[c].clone();
        members.sort_unstable();

        if members.len() > 1 {
            order
                .cycles
                .push(members.iter().map(|&m| nodes[m].clone()).collect());
        }
        order.tables.extend(members.iter().map(|&m| nodes[m].clone()));

        for &next in &successors[c] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse((key(next), next)));
            }
        }
    }

    order
}

/// Tarjan's algorithm, iterative
fn strongly_connected(edges: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = edges.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        let mut work: Vec<(usize, Vec<usize>)> = Vec::new();
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        work.push((root, edges[root].iter().copied().collect()));

        while let Some((node, pending)) = work.last_mut() {
            let node = *node;
            if let Some(next) = pending.pop() {
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    work.push((next, edges[next].iter().copied().collect()));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            work.pop();
            if let Some((parent, _)) = work.last() {
                lowlink[*parent] = lowlink[*parent].min(lowlink[node]);
            }

            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
