// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ProjectFixture;

use anyhow::Result;
use indoc::{formatdoc, indoc};
use mdpatch::{
    apply::{ApplyError, ApplySummary, Runner},
    config::PatchPlan,
};
use pretty_assertions::{assert_eq, assert_ne};
use sealed_test::prelude::*;
use std::env::current_dir;

#[sealed_test]
fn apply_plan_patches_project_tree() -> Result<()> {
    let fixture = ProjectFixture::new(
        "work",
        indoc! {r#"
            -- src/package.xml --
            <?xml version="1.0" encoding="UTF-8"?>
            <Package xmlns="http://soap.sforce.com/2006/04/metadata">
                <types>
                    <members>*</members>
                    <name>ApexClass</name>
                </types>
                <types>
                    <members>*</members>
                    <name>Document</name>
                </types>
                <version>43.0</version>
            </Package>
            -- src/objects/Invoice__c.object --
            <?xml version="1.0" encoding="UTF-8"?>
            <CustomObject>
                <listViews>
                    <fullName>All</fullName>
                </listViews>
                <label>Invoice</label>
            </CustomObject>
            -- src/installedPackages/acme.installedPackage --
            <?xml version="1.0" encoding="UTF-8"?>
            <InstalledPackage>
                <versionNumber>2.4</versionNumber>
            </InstalledPackage>
            -- src/classes/Billing.cls-meta.xml --
            <?xml version="1.0" encoding="UTF-8"?>
            <ApexClass>
                <packageVersions>
                    <majorNumber>1</majorNumber>
                    <minorNumber>7</minorNumber>
                    <namespace>acme</namespace>
                </packageVersions>
            </ApexClass>
        "#},
    )?;
    let plan: PatchPlan = indoc! {r#"
        description = "release cleanup"

        [[rule]]
        kind = "ensure-section"
        manifest = "src/package.xml"
        type_name = "FlowDefinition"
        members = ["*"]

        [[rule]]
        kind = "remove-section"
        manifest = "src/package.xml"
        type_name = "Document"

        [[rule]]
        kind = "set-version"
        manifest = "src/package.xml"
        version = "58.0"

        [[rule]]
        kind = "strip-elements"
        file = "src/objects/Invoice__c.object"
        element = "listViews"

        [[rule]]
        kind = "conform"
        root = "src"
        prefix = "acme"
    "#}
    .parse()?;
    let runner = Runner::new(fixture.root(), false);

    let summary = runner.apply(&plan)?;

    assert_eq!(
        summary,
        ApplySummary {
            rules: 5,
            changed: 5,
        }
    );
    let expect = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <Package xmlns="http://soap.sforce.com/2006/04/metadata">
            <types>
                <members>*</members>
                <name>ApexClass</name>
            </types>
            <types>
                <members>*</members>
                <name>FlowDefinition</name>
            </types>
            <version>58.0</version>
        </Package>
    "#};
    assert_eq!(fixture.read("src/package.xml")?, expect);
    let expect = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <CustomObject>
            <label>Invoice</label>
        </CustomObject>
    "#};
    assert_eq!(fixture.read("src/objects/Invoice__c.object")?, expect);
    let expect = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <ApexClass>
            <packageVersions>
                <majorNumber>2</majorNumber>
                <minorNumber>4</minorNumber>
                <namespace>acme</namespace>
            </packageVersions>
        </ApexClass>
    "#};
    assert_eq!(fixture.read("src/classes/Billing.cls-meta.xml")?, expect);

    // Second application holds still.
    let summary = runner.apply(&plan)?;
    assert_eq!(
        summary,
        ApplySummary {
            rules: 5,
            changed: 0,
        }
    );
    Ok(())
}

#[sealed_test]
fn prefix_swap_plan_renames_objects_and_rewrites_tree() -> Result<()> {
    let fixture = ProjectFixture::new(
        "work",
        indoc! {r#"
            -- src/package.xml --
            <Package>
                <types>
                    <members>acme__Invoice__c</members>
                    <name>CustomObject</name>
                </types>
                <version>43.0</version>
            </Package>
            -- src/objects/acme__Invoice__c.object --
            <CustomObject>
                <formula>acme__Subtotal__c + acme.Tax.rate()</formula>
            </CustomObject>
            -- src/pages/Billing.page --
            <apex:page controller="acme.BillingController">
                <installed><namespace>acme</namespace></installed>
            </apex:page>
        "#},
    )?;
    let plan: PatchPlan = indoc! {r#"
        [[rule]]
        kind = "prefix-swap"
        root = "src"
        old = "acme"
        new = "blah"
    "#}
    .parse()?;

    let summary = Runner::new(fixture.root(), false).apply(&plan)?;

    assert_eq!(
        summary,
        ApplySummary {
            rules: 1,
            changed: 1,
        }
    );
    assert!(!fixture.path("src/objects/acme__Invoice__c.object").exists());
    let expect = indoc! {r#"
        <CustomObject>
            <formula>blah__Subtotal__c + blah.Tax.rate()</formula>
        </CustomObject>
    "#};
    assert_eq!(fixture.read("src/objects/blah__Invoice__c.object")?, expect);
    let expect = indoc! {r#"
        <apex:page controller="blah.BillingController">
            <installed><namespace>blah</namespace></installed>
        </apex:page>
    "#};
    assert_eq!(fixture.read("src/pages/Billing.page")?, expect);
    let content = fixture.read("src/package.xml")?;
    assert!(content.contains("<members>blah__Invoice__c</members>"));
    Ok(())
}

#[sealed_test]
fn strict_apply_halts_before_later_rules() -> Result<()> {
    let fixture = ProjectFixture::new(
        "work",
        indoc! {r#"
            -- src/package.xml --
            <Package>
                <version>43.0</version>
            </Package>
        "#},
    )?;
    let path = current_dir()?.join(fixture.path("src/package.xml"));
    let path = path.display();
    let plan: PatchPlan = formatdoc! {r#"
        [[rule]]
        kind = "remove-section"
        manifest = "{path}"
        type_name = "Document"

        [[rule]]
        kind = "set-version"
        manifest = "{path}"
        version = "58.0"
    "#}
    .parse()?;

    let result = Runner::new(fixture.root(), true).apply(&plan);

    assert!(matches!(result, Err(ApplyError::MissingSection { .. })));
    let content = fixture.read("src/package.xml")?;
    assert!(content.contains("<version>43.0</version>"));
    Ok(())
}

#[sealed_test]
fn ensure_remove_plans_round_trip_on_disk() -> Result<()> {
    let fixture = ProjectFixture::new(
        "work",
        indoc! {r#"
            -- src/package.xml --
            <Package>
                <types>
                    <members>*</members>
                    <name>ApexClass</name>
                </types>
                <version>43.0</version>
            </Package>
        "#},
    )?;
    let before = fixture.read("src/package.xml")?;
    let runner = Runner::new(fixture.root(), false);

    let ensure: PatchPlan = indoc! {r#"
        [[rule]]
        kind = "ensure-section"
        manifest = "src/package.xml"
        type_name = "FlowDefinition"
        members = ["*"]
    "#}
    .parse()?;
    let summary = runner.apply(&ensure)?;
    assert_eq!(summary.changed, 1);
    assert_ne!(fixture.read("src/package.xml")?, before);

    let remove: PatchPlan = indoc! {r#"
        [[rule]]
        kind = "remove-section"
        manifest = "src/package.xml"
        type_name = "FlowDefinition"
    "#}
    .parse()?;
    let summary = runner.apply(&remove)?;
    assert_eq!(summary.changed, 1);
    assert_eq!(fixture.read("src/package.xml")?, before);
    Ok(())
}
