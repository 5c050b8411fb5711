//! Integration tests for the read/diff/apply adapter.
//!
//! The resource under test manages a set of tags on an in-memory object and
//! counts how often each apply method is called.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;
use stratus_reconcile::{
    CancellationToken, ClusterObject, CrudAdapter, CrudResource, Pass, Resource, ResourceSet,
    Result,
};

struct TestCluster {
    tags: BTreeMap<String, String>,
}

impl ClusterObject for TestCluster {
    fn cluster_id(&self) -> &str {
        "c1"
    }

    fn base_domain(&self) -> &str {
        "example.io"
    }
}

type Tags = BTreeMap<String, String>;

#[derive(Default)]
struct TagResource {
    live: Mutex<Tags>,
    creates: AtomicUsize,
    deletes: AtomicUsize,
}

#[async_trait]
impl CrudResource<TestCluster> for TagResource {
    type State = Tags;
    type Change = Tags;

    fn name(&self) -> &str {
        "tags"
    }

    async fn current_state(&self, _pass: &mut Pass, _obj: &TestCluster) -> Result<Tags> {
        Ok(self.live.lock().unwrap().clone())
    }

    async fn desired_state(&self, pass: &mut Pass, obj: &TestCluster) -> Result<Tags> {
        if pass.is_delete() {
            return Ok(Tags::new());
        }
        Ok(obj.tags.clone())
    }

    fn new_create_change(
        &self,
        _obj: &TestCluster,
        current: &Tags,
        desired: &Tags,
    ) -> Result<Option<Tags>> {
        let missing: Tags = desired
            .iter()
            .filter(|(k, v)| current.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok((!missing.is_empty()).then_some(missing))
    }

    fn new_delete_change(
        &self,
        _obj: &TestCluster,
        current: &Tags,
        _desired: &Tags,
    ) -> Result<Option<Tags>> {
        Ok((!current.is_empty()).then(|| current.clone()))
    }

    async fn apply_create_change(
        &self,
        _pass: &mut Pass,
        _obj: &TestCluster,
        change: Tags,
    ) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().extend(change);
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        _pass: &mut Pass,
        _obj: &TestCluster,
        change: Tags,
    ) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap();
        for key in change.keys() {
            live.remove(key);
        }
        Ok(())
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn set_for(resource: &Arc<CrudAdapter<TagResource>>) -> ResourceSet<TestCluster> {
    ResourceSet::new(vec![Arc::clone(resource) as Arc<dyn Resource<TestCluster>>]).unwrap()
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let resource = Arc::new(CrudAdapter::new(TagResource::default()));
    let set = set_for(&resource);
    let obj = TestCluster {
        tags: tags(&[("owner", "team-a"), ("env", "prod")]),
    };

    set.ensure_created(&obj, CancellationToken::new(), None)
        .await
        .unwrap();
    set.ensure_created(&obj, CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(resource.inner().creates.load(Ordering::SeqCst), 1);
    assert_eq!(*resource.inner().live.lock().unwrap(), obj.tags);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let resource = Arc::new(CrudAdapter::new(TagResource::default()));
    *resource.inner().live.lock().unwrap() = tags(&[("owner", "team-a")]);
    let set = set_for(&resource);
    let obj = TestCluster { tags: Tags::new() };

    set.ensure_deleted(&obj, CancellationToken::new(), None)
        .await
        .unwrap();
    set.ensure_deleted(&obj, CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(resource.inner().deletes.load(Ordering::SeqCst), 1);
    assert!(resource.inner().live.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_adapter_name_is_inner_name() {
    let resource = CrudAdapter::new(TagResource::default());
    assert_eq!(Resource::<TestCluster>::name(&resource), "tags");
}

fn arb_tags() -> impl Strategy<Value = Tags> {
    prop::collection::btree_map("[a-c]{1,2}", "[x-z]{1,2}", 0..4)
}

proptest! {
    #[test]
    fn prop_create_change_is_noop_iff_states_match(current in arb_tags(), desired in arb_tags()) {
        let resource = TagResource::default();
        let obj = TestCluster { tags: desired.clone() };

        let change = resource.new_create_change(&obj, &current, &desired).unwrap();
        let converged = desired.iter().all(|(k, v)| current.get(k) == Some(v));
        prop_assert_eq!(change.is_none(), converged);
    }

    #[test]
    fn prop_create_change_is_noop_for_equal_states(state in arb_tags()) {
        let resource = TagResource::default();
        let obj = TestCluster { tags: state.clone() };

        prop_assert!(resource.new_create_change(&obj, &state, &state).unwrap().is_none());
    }
}
